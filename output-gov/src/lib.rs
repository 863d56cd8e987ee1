//! Output governance and packaging for conversion jobs.
//!
//! Every finished job is delivered as exactly one file: either the tool's single
//! output untouched, or a governed package holding a preview, the collected
//! artifacts and a manifest describing them.
//!
//! ```text
//!  converter args ─► ArgGovernor (validate / fix) ─► external tool
//!                                                        │
//!                                                        ▼
//!                                                   output dir
//!                                                        │
//!                                               classify_output
//!                                          single ◄──────┴──────► multi
//!                                            │                      │
//!                                       (untouched)        build_canonical_structure
//!                                                                   │
//!                                                          manifest + tar serialize
//!                                                                   │
//!                                                            <job>.cxpkg
//! ```

pub mod archive;
pub mod artifact;
pub mod classifier;
pub mod config;
pub mod error;
pub mod governance;
pub mod hints;
pub mod manifest;
pub mod natural;
pub mod structure;

pub use archive::{
    PackageOutcome, PackageOptions, Packager, archive_filename, is_archive_name,
    package_filename,
};
pub use artifact::OutputArtifact;
pub use classifier::{Classification, ReasonCode, classify_output};
pub use config::{Config, GovernanceConfig, PackagingConfig};
pub use error::{JobFailure, PackagingError, Stage, UnknownTaskType};
pub use governance::{ArgGovernor, FixedArgs, ValidationReport, is_sequence_output};
pub use hints::{HintKind, NamingHint, detect_naming, suggest_pattern};
pub use manifest::{Manifest, ManifestMetadata, TaskType};
