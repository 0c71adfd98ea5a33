//! Async exit pipeline: capability traits, instruction assembly, the gated
//! builder, reliability, receipts and the orchestrator tying them together.

pub mod ata;
pub mod builder;
pub mod orchestrator;
pub mod ports;
pub mod receipt;
pub mod reliability;
pub mod requirements;
pub mod rpc;
pub mod simulation;
pub mod tick_cache;
pub mod whirlpool;
pub mod wsol;

pub use builder::{build_exit_transaction, BuildExitConfig, BuiltExit, ExitQuote};
pub use orchestrator::{Connectors, ExecuteOutcome, ExecutionReport, Orchestrator, PositionDecision};
pub use ports::{
    AccountLookup, BalanceSource, BlockhashSource, Clock, Confirmation, ExitRebuilder, PositionSnapshot, QuoteRequest,
    QuoteSource, ReceiptFetcher, RemovePreview, RentSource, SimulationDiagnostics, Simulator, Sleeper,
    SlotSource, SnapshotSource, SwapContext, SwapInstructionSource, SwapInstructions, SystemClock,
    TokioSleeper, TransactionConfirmer, TransactionSender,
};
pub use receipt::{derive_receipt_address, record_execution_ix, verify_receipt, ExpectedReceipt, ReceiptAccount};
pub use reliability::{
    refresh_blockhash_if_needed, should_rebuild, with_bounded_retry, BlockhashRefresh, BlockhashState,
    QuoteProvenance, RebuildCheck, RebuildReason, RebuildThresholds, RetryPolicy,
};
pub use requirements::{compute_execution_requirements, FeeRequirements, RequirementsInput};
pub use rpc::RpcConnector;
pub use tick_cache::TickArrayCache;
