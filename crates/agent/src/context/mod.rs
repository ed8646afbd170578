//! Context block assembly and token estimation.
//!
//! | Section | Source | When empty |
//! |---------|--------|------------|
//! | User information | Shared profile | Placeholder line |
//! | Summary | Rolling summary | Placeholder line |
//! | Recent conversation | Verbatim history pairs | Placeholder line |
//! | Tool result | Last tool call of this turn | Omitted |

pub mod assembler;
pub mod token;

pub use assembler::{ContextAssembler, ContextSections, Directive, ToolCallReport, ToolResultSection};
