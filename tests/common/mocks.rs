//! In-memory ledger.
//!
//! Stores encoded metadata accounts and applies submitted update instructions by
//! re-encoding the account, the way the metadata program would. Failures and stalls
//! can be injected to exercise retry, cancellation and crash recovery.

use std::collections::{HashMap, HashSet};

use anyhow::{anyhow, Result};
use metadata_batch::codec;
use metadata_batch_types::{Address, OnChainRecord};
use metadata_transport::{Instruction, RemoteClient, Signer};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Address, Vec<u8>>,
    fetch_calls: usize,
    submit_calls: usize,
    /// Fetches that fail before fetches start succeeding.
    transient_fetch_failures: u32,
    /// Submissions that fail before submissions start succeeding.
    transient_submit_failures: u32,
    /// Records whose submissions always fail.
    rejected: HashSet<Address>,
    /// Fire this token once `fetch_calls` reaches the given count.
    cancel_at_fetch: Option<(usize, CancellationToken)>,
    /// Fetches after this count never complete.
    stall_after_fetches: Option<usize>,
    submitted: Vec<Address>,
}

#[derive(Default)]
pub struct FakeLedger {
    state: Mutex<LedgerState>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger holding `records`, each at its own address.
    pub fn with_records(records: &[(Address, OnChainRecord)]) -> Self {
        let ledger = Self::new();
        for (id, record) in records {
            ledger.put(*id, record);
        }
        ledger
    }

    pub fn put(&self, id: Address, record: &OnChainRecord) {
        let raw = codec::encode_account(record, &Address::new([0xee; 32]));
        self.state.lock().accounts.insert(id, raw);
    }

    pub fn put_raw(&self, id: Address, raw: Vec<u8>) {
        self.state.lock().accounts.insert(id, raw);
    }

    /// Current decoded state of a record.
    pub fn get(&self, id: &Address) -> Option<OnChainRecord> {
        let state = self.state.lock();
        state.accounts.get(id).and_then(|raw| codec::decode(raw).ok())
    }

    pub fn fail_fetches(&self, count: u32) {
        self.state.lock().transient_fetch_failures = count;
    }

    pub fn fail_submits(&self, count: u32) {
        self.state.lock().transient_submit_failures = count;
    }

    pub fn reject_submits_for(&self, id: Address) {
        self.state.lock().rejected.insert(id);
    }

    pub fn cancel_at_fetch(&self, fetch: usize, token: CancellationToken) {
        self.state.lock().cancel_at_fetch = Some((fetch, token));
    }

    pub fn stall_after_fetches(&self, fetches: usize) {
        self.state.lock().stall_after_fetches = Some(fetches);
    }

    pub fn fetch_calls(&self) -> usize {
        self.state.lock().fetch_calls
    }

    pub fn submit_calls(&self) -> usize {
        self.state.lock().submit_calls
    }

    /// Records changed by successful submissions, in order.
    pub fn submitted(&self) -> Vec<Address> {
        self.state.lock().submitted.clone()
    }

    fn apply(state: &mut LedgerState, instruction: &Instruction, signer: &Address) -> Result<()> {
        let record_id = instruction
            .accounts
            .first()
            .map(|meta| meta.address)
            .ok_or_else(|| anyhow!("instruction has no record account"))?;
        let raw = state
            .accounts
            .get(&record_id)
            .ok_or_else(|| anyhow!("account {} does not exist", record_id))?;
        let mut record = codec::decode(raw)?;
        if record.authority != *signer {
            return Err(anyhow!("custom program error: 0x7 (incorrect update authority)"));
        }
        let update = codec::decode_update_instruction(&instruction.data)?;
        record.name = update.name;
        record.symbol = update.symbol;
        record.uri = update.uri;
        let mint = Address::from_slice(&raw[33..65]).unwrap_or_default();
        state
            .accounts
            .insert(record_id, codec::encode_account(&record, &mint));
        state.submitted.push(record_id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteClient for FakeLedger {
    async fn fetch_raw(&self, address: &Address) -> Result<Option<Vec<u8>>> {
        let stall = {
            let mut state = self.state.lock();
            state.fetch_calls += 1;
            if let Some((at, token)) = &state.cancel_at_fetch {
                if state.fetch_calls == *at {
                    token.cancel();
                }
            }
            state
                .stall_after_fetches
                .is_some_and(|limit| state.fetch_calls > limit)
        };
        if stall {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock();
        if state.transient_fetch_failures > 0 {
            state.transient_fetch_failures -= 1;
            return Err(anyhow!("getAccountInfo request failed: connection reset"));
        }
        Ok(state.accounts.get(address).cloned())
    }

    async fn submit(&self, instruction: &Instruction, signer: &dyn Signer) -> Result<String> {
        let mut state = self.state.lock();
        state.submit_calls += 1;
        if state.transient_submit_failures > 0 {
            state.transient_submit_failures -= 1;
            return Err(anyhow!("sendTransaction failed with HTTP 429: rate limited"));
        }
        if let Some(meta) = instruction.accounts.first() {
            if state.rejected.contains(&meta.address) {
                return Err(anyhow!("transaction simulation failed"));
            }
        }
        Self::apply(&mut state, instruction, &signer.address())?;
        Ok(format!("sig{}", state.submit_calls))
    }
}
