//! Per-direction half-duplex busy tracker.
//!
//! A `Link` models one of an ASIC's four cardinal connections. It never owns
//! its neighbor: the mesh is cyclic, so each `Link` stores a plain `(row,
//! col)` index into the `Mesh`'s flat ASIC array rather than a reference.

pub use crate::core::byte::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsicIndex {
    pub row: usize,
    pub col: usize,
}

#[derive(Debug, Clone)]
pub struct Link {
    neighbor: Option<AsicIndex>,
    tx_busy_until: f64,
    rx_busy_until: f64,
}

impl Link {
    pub fn new() -> Link {
        Link { neighbor: None, tx_busy_until: 0.0, rx_busy_until: 0.0 }
    }

    pub fn connect(&mut self, neighbor: AsicIndex) {
        self.neighbor = Some(neighbor);
    }

    pub fn neighbor(&self) -> Option<AsicIndex> {
        self.neighbor
    }

    pub fn present(&self) -> bool {
        self.neighbor.is_some()
    }

    pub fn tx_busy_until(&self) -> f64 {
        self.tx_busy_until
    }

    pub fn rx_busy_until(&self) -> f64 {
        self.rx_busy_until
    }

    /// Attempts to mark the transmitter busy until `t`. `transfer_time` is
    /// the reference full-byte duration (ticks × t_osc) used only to space
    /// back-to-back sends.
    ///
    /// Returns `true` if the line is still busy (caller must defer / retry
    /// at a later time), `false` if `t` was accepted as the new
    /// `tx_busy_until`.
    pub fn send(&mut self, t: f64, transfer_time: f64) -> bool {
        if self.tx_busy_until > t - transfer_time {
            true
        } else {
            self.tx_busy_until = t;
            false
        }
    }

    /// Marks the receiver busy until `t`, warning if it was already busy
    /// past `t`.
    pub fn recv(&mut self, t: f64) {
        if self.rx_busy_until > t {
            tracing::warn!(rx_busy_until = self.rx_busy_until, t, "receiving on busy connection");
        } else {
            self.rx_busy_until = t;
        }
    }
}

impl Default for Link {
    fn default() -> Link {
        Link::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_link_has_no_neighbor() {
        let l = Link::new();
        assert!(!l.present());
        assert_eq!(l.neighbor(), None);
    }

    #[test]
    fn send_accepts_non_overlapping_completion() {
        let mut l = Link::new();
        assert!(!l.send(100.0, 10.0));
        assert_eq!(l.tx_busy_until(), 100.0);
        assert!(!l.send(111.0, 10.0));
    }

    #[test]
    fn send_rejects_overlapping_completion() {
        let mut l = Link::new();
        assert!(!l.send(100.0, 10.0));
        assert!(l.send(105.0, 10.0));
        assert_eq!(l.tx_busy_until(), 100.0);
    }

    #[test]
    fn consecutive_tx_busy_until_values_are_non_decreasing() {
        let mut l = Link::new();
        let mut last = 0.0;
        for t in [10.0, 25.0, 40.0, 40.0] {
            if !l.send(t, 5.0) {
                assert!(l.tx_busy_until() >= last);
                last = l.tx_busy_until();
            }
        }
    }
}
