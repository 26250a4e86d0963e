//! Bookkeeping for the DAQ-flagged ASIC's inbound byte log.
//!
//! An `Asic` with `is_daq_node = true` writes every received byte here
//! instead of its local FIFO (see `Asic::receive`). `DaqLog` is the Rust
//! analogue of the source's `DaqFifo`: same FIFO discipline, plus running
//! tallies per word type and the set of contributing ASICs.

use crate::core::byte::{Byte, WordType};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone)]
pub struct DaqRecord {
    pub daq_t: u64,
    pub word_type: WordType,
    pub row: usize,
    pub col: usize,
    pub byte: Byte,
}

#[derive(Debug, Clone, Default)]
pub struct DaqLog {
    records: VecDeque<DaqRecord>,
    max_size: usize,
    total_writes: u64,
    data_words: u64,
    end_words: u64,
    req_words: u64,
    resp_words: u64,
    received_asics: HashSet<(usize, usize)>,
}

impl DaqLog {
    pub fn new() -> DaqLog {
        DaqLog::default()
    }

    pub fn write(&mut self, record: DaqRecord) {
        match record.word_type {
            WordType::Data => self.data_words += 1,
            WordType::EvtEnd => self.end_words += 1,
            WordType::RegReq => self.req_words += 1,
            WordType::RegResp => self.resp_words += 1,
        }
        self.received_asics.insert((record.row, record.col));
        self.records.push_back(record);
        self.total_writes += 1;
        if self.records.len() > self.max_size {
            self.max_size = self.records.len();
        }
    }

    /// Drains and returns every record currently stored, oldest first.
    pub fn drain(&mut self) -> Vec<DaqRecord> {
        self.records.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn data_words(&self) -> u64 {
        self.data_words
    }

    pub fn end_words(&self) -> u64 {
        self.end_words
    }

    pub fn req_words(&self) -> u64 {
        self.req_words
    }

    pub fn resp_words(&self) -> u64 {
        self.resp_words
    }

    pub fn total_writes(&self) -> u64 {
        self.total_writes
    }

    pub fn received_asics(&self) -> &HashSet<(usize, usize)> {
        &self.received_asics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::byte::Byte;

    #[test]
    fn tallies_word_types_and_contributors() {
        let mut log = DaqLog::new();
        log.write(DaqRecord { daq_t: 1, word_type: WordType::Data, row: 0, col: 1, byte: Byte::data(0, 1, 1, &[3], 0.0) });
        log.write(DaqRecord { daq_t: 2, word_type: WordType::EvtEnd, row: 0, col: 1, byte: Byte::evt_end(0, 1, 2, 7.0) });

        assert_eq!(log.data_words(), 1);
        assert_eq!(log.end_words(), 1);
        assert!(log.received_asics().contains(&(0, 1)));
    }

    #[test]
    fn drain_empties_log_and_preserves_order() {
        let mut log = DaqLog::new();
        log.write(DaqRecord { daq_t: 1, word_type: WordType::Data, row: 0, col: 0, byte: Byte::data(0, 0, 1, &[0], 0.0) });
        log.write(DaqRecord { daq_t: 2, word_type: WordType::Data, row: 0, col: 0, byte: Byte::data(0, 0, 2, &[0], 0.0) });
        let drained = log.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].daq_t, 1);
        assert!(log.is_empty());
    }
}
