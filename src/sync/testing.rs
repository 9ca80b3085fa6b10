// In-memory table endpoint and scripted operator for tests.
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use tokio_util::sync::CancellationToken;

use crate::errors::ProviderError;
use crate::operator::Operator;
use crate::table::{IdentityKey, Record, ScanCursor, ScanPage, TableEndpoint};

const OFFSET_ATTRIBUTE: &str = "offset";

pub fn record(id: &str) -> Record {
    Record::from([
        ("id".to_string(), AttributeValue::S(id.to_string())),
        ("name".to_string(), AttributeValue::S(format!("item {id}"))),
    ])
}

pub fn records(ids: &[&str]) -> Vec<Record> {
    ids.iter().map(|id| record(id)).collect()
}

pub fn ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .map(|r| match r.get("id") {
            Some(AttributeValue::S(s)) => s.clone(),
            other => format!("{other:?}"),
        })
        .collect()
}

/// Table held in memory, paged by offset, with upsert-on-`id` writes.
pub struct MemoryTable {
    name: String,
    page_size: usize,
    records: Mutex<Vec<Record>>,
    scan_failures: Mutex<HashMap<usize, ProviderError>>,
    batch_failures: Mutex<HashMap<usize, ProviderError>>,
    scan_calls: AtomicUsize,
    batch_calls: Mutex<Vec<Vec<Record>>>,
    cancel_after_batch: Mutex<Option<(usize, CancellationToken)>>,
}

impl MemoryTable {
    pub fn new(name: &str, page_size: usize) -> Self {
        Self {
            name: name.to_string(),
            page_size,
            records: Mutex::new(Vec::new()),
            scan_failures: Mutex::new(HashMap::new()),
            batch_failures: Mutex::new(HashMap::new()),
            scan_calls: AtomicUsize::new(0),
            batch_calls: Mutex::new(Vec::new()),
            cancel_after_batch: Mutex::new(None),
        }
    }

    pub fn with_records(self, records: Vec<Record>) -> Self {
        *self.records.lock().unwrap() = records;
        self
    }

    /// The zero-based `call`-th scan request fails once with `error`.
    pub fn fail_scan_call(self, call: usize, error: ProviderError) -> Self {
        self.scan_failures.lock().unwrap().insert(call, error);
        self
    }

    /// The zero-based `call`-th batch put fails with `error` and writes nothing.
    pub fn fail_batch_call(self, call: usize, error: ProviderError) -> Self {
        self.batch_failures.lock().unwrap().insert(call, error);
        self
    }

    /// Cancels `token` once the zero-based `call`-th batch put has been applied.
    pub fn cancel_after_batch_call(self, call: usize, token: CancellationToken) -> Self {
        *self.cancel_after_batch.lock().unwrap() = Some((call, token));
        self
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    /// Every attempted batch put, failed ones included.
    pub fn batch_calls(&self) -> Vec<Vec<Record>> {
        self.batch_calls.lock().unwrap().clone()
    }

    pub fn snapshot(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

fn offset_of(cursor: &ScanCursor) -> usize {
    match cursor.as_key().get(OFFSET_ATTRIBUTE) {
        Some(AttributeValue::N(n)) => n.parse().unwrap(),
        other => panic!("unexpected cursor {other:?}"),
    }
}

#[async_trait]
impl TableEndpoint for MemoryTable {
    fn table_name(&self) -> &str {
        &self.name
    }

    async fn scan_page(&self, cursor: Option<ScanCursor>) -> Result<ScanPage, ProviderError> {
        let call = self.scan_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.scan_failures.lock().unwrap().remove(&call) {
            return Err(error);
        }

        let records = self.records.lock().unwrap();
        let start = cursor.as_ref().map(offset_of).unwrap_or(0).min(records.len());
        let end = (start + self.page_size).min(records.len());
        let next_cursor = (end < records.len())
            .then(|| {
                ScanCursor::from_key(HashMap::from([(
                    OFFSET_ATTRIBUTE.to_string(),
                    AttributeValue::N(end.to_string()),
                )]))
            })
            .flatten();

        Ok(ScanPage {
            records: records[start..end].to_vec(),
            next_cursor,
        })
    }

    async fn batch_put(&self, batch: &[Record]) -> Result<(), ProviderError> {
        let call = {
            let mut calls = self.batch_calls.lock().unwrap();
            calls.push(batch.to_vec());
            calls.len() - 1
        };
        if let Some(error) = self.batch_failures.lock().unwrap().remove(&call) {
            return Err(error);
        }

        let mut records = self.records.lock().unwrap();
        for item in batch {
            let key = IdentityKey::of(item, "id");
            match records
                .iter()
                .position(|existing| key.is_some() && IdentityKey::of(existing, "id") == key)
            {
                Some(index) => records[index] = item.clone(),
                None => records.push(item.clone()),
            }
        }
        if let Some((_, token)) = self.cancel_after_batch.lock().unwrap().as_ref().filter(|(at, _)| *at == call) {
            token.cancel();
        }
        Ok(())
    }
}

/// Operator that answers from a script and records what it was asked and shown.
#[derive(Default)]
pub struct ScriptedOperator {
    answers: Mutex<VecDeque<String>>,
    confirmations: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
    shown: Mutex<Vec<String>>,
}

impl ScriptedOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answers<const N: usize>(self, answers: [&str; N]) -> Self {
        self.answers
            .lock()
            .unwrap()
            .extend(answers.iter().map(|a| a.to_string()));
        self
    }

    pub fn with_confirmations<const N: usize>(self, confirmations: [bool; N]) -> Self {
        self.confirmations.lock().unwrap().extend(confirmations);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().unwrap().clone()
    }

    fn next_answer(&self, message: &str, default: &str) -> String {
        self.prompts.lock().unwrap().push(message.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| default.to_string())
    }
}

impl Operator for ScriptedOperator {
    fn input(&self, message: &str, default: &str) -> Result<String> {
        Ok(self.next_answer(message, default))
    }

    fn choose(&self, message: &str, _choices: &[&str], default: &str) -> Result<String> {
        Ok(self.next_answer(message, default))
    }

    fn confirm(&self, message: &str) -> Result<bool> {
        self.prompts.lock().unwrap().push(message.to_string());
        Ok(self.confirmations.lock().unwrap().pop_front().unwrap_or(false))
    }

    fn show(&self, message: &str) {
        self.shown.lock().unwrap().push(message.to_string());
    }
}
