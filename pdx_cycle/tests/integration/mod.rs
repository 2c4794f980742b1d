//! Shared fixtures for the integration tests.

pub mod link_monitor;
pub mod process_data;
pub mod scheduling;
pub mod setup_failure;
pub mod shutdown;

use pdx_common::config::EngineConfig;
use pdx_common::master::FieldbusMaster;
use pdx_common::time::Timestamp;
use pdx_cycle::{EngineEvent, ExchangeLoop, setup};
use pdx_sim::{SimClock, SimulatedLibrary, SimulatedMaster};

/// Virtual time at which every test starts.
pub const ANCHOR: Timestamp = Timestamp::new(1_000, 0);

/// 1 kHz.
pub const PERIOD_NS: u64 = 1_000_000;

pub type SimEngine = ExchangeLoop<SimulatedMaster, SimClock, Vec<EngineEvent>>;

/// Single output slave at alias 69 with two byte entries.
pub const REFERENCE: &str = r#"
[shared]
service_name = "pdx-it"

[cycle]
frequency_hz = 1000

[master]
index = 0

[[slaves]]
alias = 69
position = 0
vendor_id = 0x0000079A
product_code = 0xDEADBEEF

[[slaves.entries]]
index = 0x0005
subindex = 1

[[slaves.entries]]
index = 0x0005
subindex = 2

[application]
index = 0x0005
subindex = 1
"#;

/// Reference slave plus an input terminal at position 1.
pub const WITH_INPUTS: &str = r#"
[shared]
service_name = "pdx-it"

[cycle]
frequency_hz = 1000

[master]
index = 0

[[slaves]]
alias = 69
position = 0
vendor_id = 0x0000079A
product_code = 0xDEADBEEF

[[slaves.entries]]
index = 0x0005
subindex = 1

[[slaves]]
position = 1
vendor_id = 0x00000002
product_code = 0x03F03052

[[slaves.entries]]
index = 0x6000
subindex = 1
bit_length = 16
direction = "input"
"#;

pub fn config(toml: &str) -> EngineConfig {
    EngineConfig::from_toml(toml).expect("valid test config")
}

/// Set up an engine on a bus built from `config`.
pub fn engine(config: &EngineConfig, clock: SimClock) -> SimEngine {
    let mut library = SimulatedLibrary::from_config(config);
    setup(&mut library, config, clock, Vec::new()).expect("setup succeeds")
}

/// Take the collected events out of the engine.
pub fn drain(engine: &mut SimEngine) -> Vec<EngineEvent> {
    std::mem::take(engine.sink_mut())
}

/// Copy of the current domain image.
pub fn domain_image(engine: &mut SimEngine) -> Vec<u8> {
    let domain = engine.domain();
    engine
        .master_mut()
        .domain_data(domain)
        .map(|d| d.to_vec())
        .unwrap_or_default()
}
