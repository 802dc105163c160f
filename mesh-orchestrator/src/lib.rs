mod error;
mod install;
mod package;

pub use error::OrchestratorError;
pub use install::{services_root, InstallResult, Orchestrator, PackageMeta};
pub use package::{export_directory, validate_archive, write_files, Manifest, ParsedPackage};
