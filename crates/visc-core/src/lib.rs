//! Shared vocabulary for the visc sweep orchestrator: parameter combinations
//! and their directory encoding, the input-deck heuristic, the error taxonomy
//! and the issue list carried by every report.

pub mod combination;
pub mod deck;
pub mod errors;
pub mod issues;
pub mod provenance;
pub mod serde;

pub use combination::{
    decimal_repr, distribution_code, distribution_label, float_token, DirTokens,
    ParameterCombination, MISSING_TOKEN, RUN_DIR_PREFIX,
};
pub use deck::{find_candidate, parse_candidate_tokens, rewrite_candidate, CandidateLine, Rewrite};
pub use errors::{io_error, ErrorInfo, SweepError};
pub use issues::{Issue, IssueKind};
pub use provenance::RunProvenance;
pub use self::serde::{from_json_slice, stable_hash_string, to_canonical_json_bytes};
