use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tar::Archive;

use crate::error::OrchestratorError;

/// Optional `manifest.json` at the root of a service's directory inside
/// the archive (spec.md §4.6 "Packages").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

pub struct ParsedPackage {
    pub service_name: String,
    pub manifest: Option<Manifest>,
    pub files: HashMap<PathBuf, Vec<u8>>,
    pub archive_hash: String,
}

const MAIN_MODULE_STEM: &str = "main";

/// Validates a package's structure: exactly one top-level directory named
/// for the service, containing a `main` module and an optional
/// `manifest.json` (spec.md §4.6 "Install").
pub fn validate_archive(bytes: &[u8]) -> Result<ParsedPackage, OrchestratorError> {
    let archive_hash = hex::encode(Sha256::digest(bytes));

    let mut files: HashMap<PathBuf, Vec<u8>> = HashMap::new();
    let mut top_level_dirs: Vec<String> = Vec::new();

    let mut archive = Archive::new(GzDecoder::new(bytes));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_path_buf();
        let mut components = path.components();
        if let Some(first) = components.next() {
            let name = first.as_os_str().to_string_lossy().to_string();
            if !top_level_dirs.contains(&name) {
                top_level_dirs.push(name);
            }
        }
        if entry.header().entry_type().is_file() {
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents)?;
            files.insert(path, contents);
        }
    }

    if top_level_dirs.len() != 1 {
        return Err(OrchestratorError::InvalidPackage(format!(
            "expected exactly one top-level directory, found {}",
            top_level_dirs.len()
        )));
    }
    let service_name = top_level_dirs.remove(0);

    let has_main = files.keys().any(|p| {
        p.parent().map(|parent| parent == Path::new(&service_name)).unwrap_or(false)
            && p.file_stem().map(|s| s == MAIN_MODULE_STEM).unwrap_or(false)
    });
    if !has_main {
        return Err(OrchestratorError::InvalidPackage(format!(
            "{service_name}/main.* module is required"
        )));
    }

    let manifest_path = PathBuf::from(&service_name).join("manifest.json");
    let manifest = match files.get(&manifest_path) {
        Some(bytes) => Some(serde_json::from_slice(bytes)?),
        None => None,
    };

    Ok(ParsedPackage { service_name, manifest, files, archive_hash })
}

/// Re-tars an installed service's on-disk directory into a gzip byte
/// stream (spec.md §4.6 "Export").
pub fn export_directory(dir: &Path, service_name: &str) -> Result<Vec<u8>, OrchestratorError> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(service_name, dir)?;
    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Writes a validated package's files to `install_dir`.
pub fn write_files(install_dir: &Path, package: &ParsedPackage) -> Result<usize, OrchestratorError> {
    std::fs::create_dir_all(install_dir)?;
    let prefix = PathBuf::from(&package.service_name);
    let mut count = 0;
    for (path, contents) in &package.files {
        let relative = path.strip_prefix(&prefix).unwrap_or(path);
        let target = install_dir.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, contents)?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_test_archive(service: &str, with_manifest: bool) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let main_contents = b"print('hello')";
        let mut header = tar::Header::new_gnu();
        header.set_size(main_contents.len() as u64);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{service}/main.py"), &main_contents[..])
            .unwrap();

        if with_manifest {
            let manifest = serde_json::to_vec(&Manifest {
                name: service.to_string(),
                version: "1.0.0".to_string(),
                dependencies: vec![],
            })
            .unwrap();
            let mut header = tar::Header::new_gnu();
            header.set_size(manifest.len() as u64);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{service}/manifest.json"), &manifest[..])
                .unwrap();
        }

        let encoder = builder.into_inner().unwrap();
        let mut bytes = encoder.finish().unwrap();
        let mut out = Vec::new();
        out.append(&mut bytes);
        out
    }

    #[test]
    fn validates_well_formed_package() {
        let archive = build_test_archive("echo", true);
        let parsed = validate_archive(&archive).unwrap();
        assert_eq!(parsed.service_name, "echo");
        assert!(parsed.manifest.is_some());
    }

    #[test]
    fn rejects_package_without_main_module() {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let contents = b"noop";
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_cksum();
        builder.append_data(&mut header, "echo/readme.txt", &contents[..]).unwrap();
        let encoder = builder.into_inner().unwrap();
        let archive = encoder.finish().unwrap();

        assert!(validate_archive(&archive).is_err());
    }
}
