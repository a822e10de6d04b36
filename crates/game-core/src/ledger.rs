use std::collections::{BTreeMap, BTreeSet};

use contracts::{RoundOrder, RoundRecord};

/// Keyed store of one settled record per (participant, round).
///
/// Lookups for participants or rounds without history return nothing rather than
/// an error; callers fall back to the experiment's initial values.
pub trait RoundLedger {
    /// Inserts the record, replacing any record with the same key.
    fn put(&mut self, record: RoundRecord);

    fn get(&self, participant_id: &str, round_number: u32) -> Option<RoundRecord>;

    /// Records for rounds `1..=up_to_round` in the requested order.
    fn list(&self, participant_id: &str, up_to_round: u32, order: RoundOrder)
        -> Vec<RoundRecord>;

    fn participants(&self) -> Vec<String>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    records: BTreeMap<(String, u32), RoundRecord>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> impl Iterator<Item = &RoundRecord> {
        self.records.values()
    }
}

impl RoundLedger for MemoryLedger {
    fn put(&mut self, record: RoundRecord) {
        let key = (record.participant_id.clone(), record.round_number);
        self.records.insert(key, record);
    }

    fn get(&self, participant_id: &str, round_number: u32) -> Option<RoundRecord> {
        self.records
            .get(&(participant_id.to_string(), round_number))
            .cloned()
    }

    fn list(
        &self,
        participant_id: &str,
        up_to_round: u32,
        order: RoundOrder,
    ) -> Vec<RoundRecord> {
        if up_to_round == 0 {
            return Vec::new();
        }

        let start = (participant_id.to_string(), 1);
        let end = (participant_id.to_string(), up_to_round);
        let range = self.records.range(start..=end).map(|(_, record)| record.clone());

        match order {
            RoundOrder::Ascending => range.collect(),
            RoundOrder::Descending => range.rev().collect(),
        }
    }

    fn participants(&self) -> Vec<String> {
        self.records
            .keys()
            .map(|(participant_id, _)| participant_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
