// Statement Convert - Core Library
// Bank statement tables → ledger → OFX / QBO / IIF, plus the async job
// machinery used by the CLI, the API server, and tests

pub mod parser;         // Table Parser - OCR CSV tables → raw rows
pub mod normalizer;     // Transaction Normalizer - raw rows → signed transactions
pub mod ledger;         // Ledger Consolidator - tables → one ordered ledger
pub mod continuity;     // Running-balance continuity report (optional)
pub mod emit;           // Format Emitters - OFX, QBO, IIF
pub mod pipeline;       // Parser → Normalizer → Ledger → Emitter
pub mod error;
pub mod config;
pub mod upload;
pub mod job;            // ConversionJob + stage machine
pub mod status;         // Job Status Protocol + client poller
pub mod storage;        // Object store (local / memory)
pub mod job_store;      // Job store (memory / SQLite)
pub mod extract;        // Table extraction seam (OCR lives outside)
pub mod orchestrator;   // Conversion Job Orchestrator

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use parser::{RawTableRow, TableParser, split_tables};
pub use normalizer::{Normalizer, ReviewFlag, Transaction, extract_payee, parse_amount};
pub use ledger::Ledger;
pub use continuity::{ContinuityEngine, ContinuityReport};
pub use emit::{
    AccountConfig, Artifact, EmitRequest, Emitter, OutputFormat,
    IifEmitter, OfxDialect, OfxEmitter, get_emitter,
};
pub use pipeline::{Conversion, Pipeline};
pub use error::ConvertError;
pub use config::{Settings, load_settings};
pub use upload::{Upload, UploadFile, UploadLimits, validate_upload};
pub use job::{ConversionJob, JobStage, ProcessingType};
pub use status::{JobStatusView, PollOutcome, PollPolicy, StageIndicator, StatusPoller, StatusSource};
pub use storage::{LocalObjectStore, MemoryObjectStore, ObjectStore, StoredObject};
pub use job_store::{JobStore, MemoryJobStore, SqliteJobStore};
pub use extract::{CsvTableExtractor, TableExtractor};
pub use orchestrator::{Download, Orchestrator, OrchestratorSettings};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
