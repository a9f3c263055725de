use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use serde_sarif::sarif::{Artifact, ArtifactLocation, ArtifactRoles};
use tracing::debug;
use zip::ZipArchive;

use crate::classfile::parse_class;
use crate::ir::RawClass;
use crate::resolver::ClassLoader;

/// Parsed input classes and the artifacts they came from.
pub struct ScanOutput {
    pub classes: Vec<ScannedClass>,
    pub artifacts: Vec<Artifact>,
}

/// Class parsed from an input artifact.
pub struct ScannedClass {
    pub class: RawClass,
    pub artifact_index: i64,
}

/// Parse every class under a `.class` file, JAR or directory, in deterministic order.
pub fn scan_inputs(input: &Path) -> Result<ScanOutput> {
    let mut output = ScanOutput {
        classes: Vec::new(),
        artifacts: Vec::new(),
    };
    scan_path(input, true, true, &mut output)?;
    Ok(output)
}

fn scan_path(path: &Path, is_input: bool, strict: bool, output: &mut ScanOutput) -> Result<()> {
    if path.is_dir() {
        scan_dir(path, output)?;
        return Ok(());
    }

    let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    let roles = if is_input {
        Some(vec![
            serde_json::to_value(ArtifactRoles::AnalysisTarget)
                .context("serialize artifact role")?,
        ])
    } else {
        None
    };

    match extension {
        "class" => scan_class_file(path, roles, output),
        "jar" => scan_jar_file(path, roles, output),
        _ => {
            if strict {
                anyhow::bail!("unsupported input file: {}", path.display())
            } else {
                Ok(())
            }
        }
    }
}

fn scan_dir(path: &Path, output: &mut ScanOutput) -> Result<()> {
    for entry in sorted_dir_entries(path)? {
        if entry.is_dir() {
            scan_dir(&entry, output)?;
        } else {
            scan_path(&entry, false, false, output)?;
        }
    }
    Ok(())
}

fn sorted_dir_entries(path: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path)
        .with_context(|| format!("failed to read directory {}", path.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read entry under {}", path.display()))?;
        entries.push(entry.path());
    }
    // Keep deterministic ordering by sorting directory listings.
    entries.sort_by(|a, b| path_key(a).cmp(&path_key(b)));
    Ok(entries)
}

fn scan_class_file(path: &Path, roles: Option<Vec<Value>>, output: &mut ScanOutput) -> Result<()> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let class = parse_class(&data).with_context(|| format!("failed to parse {}", path.display()))?;
    let artifact_index =
        push_artifact(path_to_uri(path), data.len() as u64, None, roles, &mut output.artifacts);
    output.classes.push(ScannedClass {
        class,
        artifact_index,
    });
    Ok(())
}

fn scan_jar_file(path: &Path, roles: Option<Vec<Value>>, output: &mut ScanOutput) -> Result<()> {
    let file = fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("failed to read {}", path.display()))?;

    let jar_len = fs::metadata(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .len();
    let jar_index = push_artifact(path_to_uri(path), jar_len, None, roles, &mut output.artifacts);

    for name in jar_class_entries(&mut archive, path)? {
        let mut entry = archive
            .by_name(&name)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}:{}", path.display(), name))?;
        let class = parse_class(&data)
            .with_context(|| format!("failed to parse {}:{}", path.display(), name))?;
        let artifact_index = push_artifact(
            jar_entry_uri(path, &name),
            entry.size(),
            Some(jar_index),
            None,
            &mut output.artifacts,
        );
        output.classes.push(ScannedClass {
            class,
            artifact_index,
        });
    }

    Ok(())
}

fn jar_class_entries(archive: &mut ZipArchive<fs::File>, path: &Path) -> Result<Vec<String>> {
    let mut entry_names = Vec::new();
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.ends_with(".class") && !name.ends_with("module-info.class") {
            entry_names.push(name);
        }
    }
    entry_names.sort();
    Ok(entry_names)
}

fn push_artifact(
    uri: String,
    len: u64,
    parent_index: Option<i64>,
    roles: Option<Vec<Value>>,
    artifacts: &mut Vec<Artifact>,
) -> i64 {
    let location = ArtifactLocation::builder().uri(uri).build();
    let artifact = match (parent_index, roles) {
        (Some(parent_index), Some(roles)) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .parent_index(parent_index)
            .roles(roles)
            .build(),
        (Some(parent_index), None) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .parent_index(parent_index)
            .build(),
        (None, Some(roles)) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .roles(roles)
            .build(),
        (None, None) => Artifact::builder()
            .location(location)
            .length(len as i64)
            .build(),
    };
    let index = artifacts.len() as i64;
    artifacts.push(artifact);
    index
}

fn path_to_uri(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

fn jar_entry_uri(jar_path: &Path, entry_name: &str) -> String {
    format!("jar:{}!/{}", jar_path.to_string_lossy(), entry_name)
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Class path over directories and JAR files, searched in the given order.
pub struct ClassPath {
    entries: Vec<ClassPathEntry>,
}

enum ClassPathEntry {
    Directory(PathBuf),
    Jar { path: PathBuf, names: BTreeSet<String> },
}

impl ClassPath {
    pub fn new(paths: &[PathBuf]) -> Result<Self> {
        let mut entries = Vec::new();
        for path in paths {
            if path.is_dir() {
                entries.push(ClassPathEntry::Directory(path.clone()));
                continue;
            }
            let file =
                fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            let mut archive = ZipArchive::new(file)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let names = jar_class_entries(&mut archive, path)?.into_iter().collect();
            entries.push(ClassPathEntry::Jar {
                path: path.clone(),
                names,
            });
        }
        Ok(ClassPath { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ClassLoader for ClassPath {
    fn can_load(&self, internal_name: &str) -> bool {
        let entry_name = format!("{internal_name}.class");
        self.entries.iter().any(|entry| match entry {
            ClassPathEntry::Directory(root) => root.join(&entry_name).is_file(),
            ClassPathEntry::Jar { names, .. } => names.contains(&entry_name),
        })
    }

    fn load(&self, internal_name: &str) -> Result<Vec<u8>> {
        let entry_name = format!("{internal_name}.class");
        for entry in &self.entries {
            match entry {
                ClassPathEntry::Directory(root) => {
                    let path = root.join(&entry_name);
                    if path.is_file() {
                        debug!(class = internal_name, path = %path.display(), "loading class");
                        return fs::read(&path)
                            .with_context(|| format!("failed to read {}", path.display()));
                    }
                }
                ClassPathEntry::Jar { path, names } => {
                    if !names.contains(&entry_name) {
                        continue;
                    }
                    debug!(class = internal_name, jar = %path.display(), "loading class");
                    let file = fs::File::open(path)
                        .with_context(|| format!("failed to open {}", path.display()))?;
                    let mut archive = ZipArchive::new(file)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    let mut entry = archive
                        .by_name(&entry_name)
                        .with_context(|| format!("failed to read {}:{}", path.display(), entry_name))?;
                    let mut data = Vec::new();
                    entry
                        .read_to_end(&mut data)
                        .with_context(|| format!("failed to read {}:{}", path.display(), entry_name))?;
                    return Ok(data);
                }
            }
        }
        anyhow::bail!("class not found on class path: {}", internal_name)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    /// Smallest valid class file: `public class <name>` with no members.
    pub(crate) fn minimal_class_bytes(name: &str) -> Vec<u8> {
        let mut data = vec![0xca, 0xfe, 0xba, 0xbe, 0x00, 0x00, 0x00, 0x34, 0x00, 0x05];
        data.extend_from_slice(&[0x07, 0x00, 0x02]);
        data.push(0x01);
        data.extend_from_slice(&(name.len() as u16).to_be_bytes());
        data.extend_from_slice(name.as_bytes());
        data.extend_from_slice(&[0x07, 0x00, 0x04]);
        let object = "java/lang/Object";
        data.push(0x01);
        data.extend_from_slice(&(object.len() as u16).to_be_bytes());
        data.extend_from_slice(object.as_bytes());
        // access, this, super, interfaces, fields, methods, attributes
        data.extend_from_slice(&[
            0x00, 0x21, 0x00, 0x01, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]);
        data
    }

    fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let file = fs::File::create(path).expect("create jar");
        let mut writer = zip::ZipWriter::new(file);
        for (name, data) in entries {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .expect("start entry");
            writer.write_all(data).expect("write entry");
        }
        writer.finish().expect("finish jar");
    }

    #[test]
    fn scan_inputs_rejects_invalid_class_file() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let class_path = temp_dir.path().join("bad.class");
        fs::write(&class_path, b"nope").expect("write test class");

        assert!(scan_inputs(&class_path).is_err());
    }

    #[test]
    fn scan_inputs_rejects_unsupported_input() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let text_path = temp_dir.path().join("notes.txt");
        fs::write(&text_path, b"text").expect("write text");

        assert!(scan_inputs(&text_path).is_err());
    }

    #[test]
    fn scan_inputs_reads_jar_entries_in_sorted_order() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let jar_path = temp_dir.path().join("sample.jar");
        write_jar(
            &jar_path,
            &[
                ("pkg/B.class", minimal_class_bytes("pkg/B")),
                ("pkg/A.class", minimal_class_bytes("pkg/A")),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".to_vec()),
            ],
        );

        let output = scan_inputs(&jar_path).expect("scan jar");

        let names: Vec<&str> = output
            .classes
            .iter()
            .map(|scanned| scanned.class.name.as_str())
            .collect();
        assert_eq!(names, vec!["pkg/A", "pkg/B"]);
        assert_eq!(output.artifacts.len(), 3);
        assert_eq!(output.classes[0].artifact_index, 1);
        let first_uri = output
            .artifacts
            .first()
            .and_then(|artifact| artifact.location.as_ref())
            .and_then(|location| location.uri.as_ref())
            .cloned()
            .expect("artifact uri");
        assert!(first_uri.ends_with("sample.jar"));
    }

    #[test]
    fn scan_inputs_walks_directories_and_skips_other_files() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let package_dir = temp_dir.path().join("pkg");
        fs::create_dir_all(&package_dir).expect("create package dir");
        fs::write(package_dir.join("A.class"), minimal_class_bytes("pkg/A")).expect("write A");
        fs::write(package_dir.join("readme.txt"), b"ignored").expect("write text");

        let output = scan_inputs(temp_dir.path()).expect("scan directory");

        assert_eq!(output.classes.len(), 1);
        assert_eq!(output.classes[0].class.name, "pkg/A");
        assert_eq!(
            output.classes[0].class.super_name.as_deref(),
            Some("java/lang/Object")
        );
    }

    #[test]
    fn class_path_loads_from_directories_and_jars() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        let classes_dir = temp_dir.path().join("classes");
        fs::create_dir_all(classes_dir.join("lib")).expect("create dir");
        fs::write(
            classes_dir.join("lib").join("Dir.class"),
            minimal_class_bytes("lib/Dir"),
        )
        .expect("write class");
        let jar_path = temp_dir.path().join("lib.jar");
        write_jar(&jar_path, &[("lib/Jarred.class", minimal_class_bytes("lib/Jarred"))]);

        let class_path = ClassPath::new(&[classes_dir, jar_path]).expect("class path");

        assert!(class_path.can_load("lib/Dir"));
        assert!(class_path.can_load("lib/Jarred"));
        assert!(!class_path.can_load("lib/Missing"));
        let bytes = class_path.load("lib/Jarred").expect("load from jar");
        assert_eq!(
            parse_class(&bytes).expect("parse loaded class").name,
            "lib/Jarred"
        );
        assert!(class_path.load("lib/Missing").is_err());
    }
}
