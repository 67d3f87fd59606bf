//! Client-side core for the HToken (HTK) system: a chain adapter, a cache of
//! the tokens a factory has created, a transaction submitter that tracks
//! confirmations, and a scanner for historical transfer events.

pub mod amount;
pub mod chain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod query;
pub mod registry;
pub mod retry;
pub mod rpc;
pub mod scanner;
pub mod submitter;
pub mod token;

pub use chain::{ChainClient, RawLog, ReceiptSummary};
pub use error::HtkError;
pub use registry::TokenRegistry;
pub use scanner::{DecodeWarning, LogScanner, ScanItem, ScanReport, TransferRecord};
pub use submitter::{
    ConfirmationPolicy, TokenAction, TransactionHandle, TransactionStatus, TransactionSubmitter,
};
pub use token::{TokenBalanceView, TokenDescriptor};
