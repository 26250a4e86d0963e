//! Canned end-to-end scenarios (S1-S6), shared by the `scenario` CLI
//! subcommand and the integration test suite so both exercise the exact
//! same mesh wiring and timing.

use crate::core::asic::{AsicConfig, Command};
use crate::core::byte::{Byte, Direction};
use crate::core::daq::DaqRecord;
use crate::core::link::AsicIndex;
use crate::core::mesh::Mesh;
use crate::driver::Driver;
use crate::error::SimResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioName {
    S1Calibrate,
    S2SoftInterrogation,
    S3HardInterrogationWithHits,
    S4BroadcastDedup,
    S5PushMode,
    S6RemoteFifoOverflow,
}

impl ScenarioName {
    pub fn parse(name: &str) -> Option<ScenarioName> {
        match name {
            "s1" => Some(ScenarioName::S1Calibrate),
            "s2" => Some(ScenarioName::S2SoftInterrogation),
            "s3" => Some(ScenarioName::S3HardInterrogationWithHits),
            "s4" => Some(ScenarioName::S4BroadcastDedup),
            "s5" => Some(ScenarioName::S5PushMode),
            "s6" => Some(ScenarioName::S6RemoteFifoOverflow),
            _ => None,
        }
    }

    pub fn run(self) -> SimResult<Vec<DaqRecord>> {
        match self {
            ScenarioName::S1Calibrate => s1_calibrate(),
            ScenarioName::S2SoftInterrogation => s2_soft_interrogation(),
            ScenarioName::S3HardInterrogationWithHits => s3_hard_interrogation_with_hits(),
            ScenarioName::S4BroadcastDedup => s4_broadcast_dedup(),
            ScenarioName::S5PushMode => s5_push_mode(),
            ScenarioName::S6RemoteFifoOverflow => s6_remote_fifo_overflow(),
        }
    }
}

/// 1x2 mesh with ASIC (0,1) routed west toward the DAQ at (0,0).
fn mesh_1xn(cols: usize, seed: u64) -> Mesh {
    let mut config = AsicConfig::default();
    config.dir_mask = Direction::West;
    Mesh::new(1, cols, config, seed)
}

pub fn s1_calibrate() -> SimResult<Vec<DaqRecord>> {
    let mesh = mesh_1xn(2, 1);
    let mut driver = Driver::new(mesh);

    let req = Byte::reg_req(0, 0, false, false, false, 0, 0, 1, None);
    driver.issue_from_daq(req, 0.0, Some(Command::Calibrate))?;
    driver.run_until(1e-2)?;

    Ok(driver.drain_daq())
}

pub fn s2_soft_interrogation() -> SimResult<Vec<DaqRecord>> {
    let mesh = mesh_1xn(3, 2);
    let mut driver = Driver::new(mesh);

    let req = Byte::reg_req(0, 0, false, false, false, 0, 0, 1, None);
    driver.issue_from_daq(req, 1e-3, Some(Command::Interrogate))?;
    driver.run_until(5e-2)?;

    Ok(driver.drain_daq())
}

pub fn s3_hard_interrogation_with_hits() -> SimResult<Vec<DaqRecord>> {
    let mesh = mesh_1xn(2, 3);
    let mut driver = Driver::new(mesh);

    let target = AsicIndex { row: 0, col: 1 };
    driver.mesh.get_mut(target).inject_hits(&[5e-6, 7e-6], Some(&[vec![3], vec![3]]));

    let req = Byte::reg_req(0, 0, false, false, false, 0, 0, 1, None);
    driver.issue_from_daq(req, 1e-5, Some(Command::HardInterrogate))?;
    driver.run_until(5e-2)?;

    Ok(driver.drain_daq())
}

pub fn s4_broadcast_dedup() -> SimResult<Vec<DaqRecord>> {
    let mut config = AsicConfig::default();
    config.dir_mask = Direction::North;
    let mesh = Mesh::new(2, 2, config, 4);
    let mut driver = Driver::new(mesh);

    let req = Byte::reg_req(0, 0, false, false, false, 0, 0, 1, None);
    driver.issue_from_daq(req, 0.0, Some(Command::Interrogate))?;
    driver.run_until(5e-2)?;

    Ok(driver.drain_daq())
}

pub fn s5_push_mode() -> SimResult<Vec<DaqRecord>> {
    let mut config = AsicConfig::default();
    config.dir_mask = Direction::West;
    config.enable_push = true;
    let mesh = Mesh::new(1, 2, config, 5);
    let mut driver = Driver::new(mesh);

    let target = AsicIndex { row: 0, col: 1 };
    driver.mesh.get_mut(target).inject_hits(&[1e-6], Some(&[vec![3]]));

    driver.run_until(5e-2)?;

    Ok(driver.drain_daq())
}

pub fn s6_remote_fifo_overflow() -> SimResult<Vec<DaqRecord>> {
    s6_remote_fifo_overflow_mesh().map(|_| Vec::new())
}

/// Like `s6_remote_fifo_overflow`, but returns the driver itself so a caller
/// can inspect the overflowed ASIC's `remote_fifo` directly.
pub fn s6_remote_fifo_overflow_mesh() -> SimResult<Driver> {
    let mut config = AsicConfig::default();
    config.dir_mask = Direction::West;
    let mesh = Mesh::new(1, 3, config, 6);
    let mut driver = Driver::new(mesh);

    let middle = AsicIndex { row: 0, col: 1 };
    for i in 0..300u32 {
        let hit = Byte::data(0, 2, i, &[1], 0.0);
        driver.mesh.get_mut(middle).receive(Direction::East, hit, 0.0, None)?;
    }

    Ok(driver)
}
