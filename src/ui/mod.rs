pub mod cards;
pub mod confirm;
pub mod icons;

pub use cards::{FleetCards, card_line, event_line};
pub use confirm::TerminalConfirm;
