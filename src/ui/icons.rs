//! Shared UI icons.
//!
//! Each icon carries a plain-text fallback for terminals without emoji support.

use console::Emoji;

// Connection
pub static LINK_UP: Emoji<'_, '_> = Emoji("🟢 ", "[UP]");
pub static LINK_DOWN: Emoji<'_, '_> = Emoji("🔴 ", "[DOWN]");
pub static LINK_RETRY: Emoji<'_, '_> = Emoji("🟡 ", "[RETRY]");

// Operation outcome
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static QUESTION: Emoji<'_, '_> = Emoji("❓ ", "[?]");

// Misc
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
pub static COMMIT: Emoji<'_, '_> = Emoji("🔖 ", "#");
