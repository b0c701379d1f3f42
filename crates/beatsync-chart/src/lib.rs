// Beat chart text notation: LCM-quantized parser and its inverse encoder

pub mod action;
pub mod alphabet;
pub mod converter;

pub use action::BeatAction;
pub use alphabet::{ActionAlphabet, FILLER, GROUP_CLOSE, GROUP_OPEN};
pub use converter::{BeatChartConverter, ParsedChart, TickMap, lcm};
