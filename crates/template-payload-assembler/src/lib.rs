//! Template payload assembly.
//!
//! This crate provides:
//! - Value resolution: flow-specific priority rules that turn one placeholder
//!   slot into one literal for one recipient
//! - PayloadAssembler: builds a recipient's wire-ready template message from a
//!   template definition, the recipient's value sources and a flow policy
//! - IdCursor: sequential allocation of media and product ids to carousel cards

mod assembler;
mod cursor;
mod error;
mod resolver;

pub use assembler::{FlowPolicy, PayloadAssembler, QUICK_REPLY_PAYLOAD};
pub use cursor::IdCursor;
pub use error::{AssemblyError, AssemblyResult};
pub use resolver::{strategy_for, CsvFlowResolver, NormalFlowResolver, ValueResolutionStrategy};
