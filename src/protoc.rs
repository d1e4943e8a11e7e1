//! Running `protoc` over generated schema files
//!
//! The bridge collects the `.proto` files of a directory, runs the compiler
//! with the configured plugins and post-processes the Rust files it wrote.
//! Any output line that is not a warning fails the run.

use crate::cancel::Cancel;
use crate::GeneratorError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, SystemTime};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Flags and post-processing of a `protoc` run
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProtocOptions {
    /// Compiler binary
    pub protoc: PathBuf,
    /// Arguments placed before the computed flags, e.g. `["protoc"]` when
    /// `protoc` is `buf`
    pub protoc_args: Vec<String>,
    /// Additional `-I` paths after the proto directory itself
    pub include_paths: Vec<PathBuf>,
    /// Output directory of the prost plugin
    pub prost_out: PathBuf,
    /// Output directory of the tonic plugin
    pub tonic_out: Option<PathBuf>,
    /// Output directory of the grpc-gateway plugin
    pub grpc_gateway_out: Option<PathBuf>,
    /// Output directory of the openapiv2 plugin
    pub openapiv2_out: Option<PathBuf>,
    /// Arguments appended after the plugin flags
    pub extra_args: Vec<String>,
    /// Generated lines starting with any of these are removed
    pub strip_line_prefixes: Vec<String>,
    /// Lines prepended to every generated Rust file
    pub build_tags: Vec<String>,
}

impl Default for ProtocOptions {
    fn default() -> Self {
        ProtocOptions {
            protoc: PathBuf::from("protoc"),
            protoc_args: Vec::new(),
            include_paths: Vec::new(),
            prost_out: PathBuf::from("."),
            tonic_out: None,
            grpc_gateway_out: None,
            openapiv2_out: None,
            extra_args: Vec::new(),
            strip_line_prefixes: Vec::new(),
            build_tags: Vec::new(),
        }
    }
}

impl ProtocOptions {
    /// Compiler arguments for `files` below `proto_dir`
    pub fn args(&self, proto_dir: &Path, files: &[PathBuf]) -> Vec<String> {
        let mut args = self.protoc_args.clone();
        args.push(format!("-I{}", proto_dir.display()));
        for p in &self.include_paths {
            args.push(format!("-I{}", p.display()));
        }
        args.push(format!("--prost_out={}", self.prost_out.display()));
        if let Some(dir) = &self.tonic_out {
            args.push(format!("--tonic_out={}", dir.display()));
        }
        if let Some(dir) = &self.grpc_gateway_out {
            args.push(format!("--grpc-gateway_out={}", dir.display()));
        }
        if let Some(dir) = &self.openapiv2_out {
            args.push(format!("--openapiv2_out={}", dir.display()));
        }
        args.extend(self.extra_args.iter().cloned());
        args.extend(files.iter().map(|f| f.display().to_string()));
        args
    }

    /// Directories receiving Rust files
    fn rust_out_dirs(&self) -> Vec<&Path> {
        let mut dirs = vec![self.prost_out.as_path()];
        if let Some(dir) = &self.tonic_out {
            if !dirs.contains(&dir.as_path()) {
                dirs.push(dir);
            }
        }
        dirs
    }

    /// Strip configured lines and prepend the build tags
    ///
    /// Tags are not prepended again when the source already starts with them.
    fn post_process(&self, source: &str) -> String {
        let mut out = String::with_capacity(source.len());
        let tagged = !self.build_tags.is_empty()
            && source
                .lines()
                .take(self.build_tags.len())
                .eq(self.build_tags.iter().map(String::as_str));
        if !tagged {
            for tag in &self.build_tags {
                out.push_str(tag);
                out.push('\n');
            }
        }
        for line in source.lines() {
            if self
                .strip_line_prefixes
                .iter()
                .any(|p| line.starts_with(p.as_str()))
            {
                continue;
            }
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Files with extension `ext` directly in `dir`, sorted
fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, GeneratorError> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == ext) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Modification time and size of a file
type Stamp = (Option<SystemTime>, u64);

/// Stamps of the Rust files in the output directories
fn snapshot(dirs: &[&Path]) -> Result<BTreeMap<PathBuf, Stamp>, GeneratorError> {
    let mut stamps = BTreeMap::new();
    for dir in dirs {
        if !dir.is_dir() {
            continue;
        }
        for path in files_with_extension(dir, "rs")? {
            let meta = fs::metadata(&path)?;
            stamps.insert(path, (meta.modified().ok(), meta.len()));
        }
    }
    Ok(stamps)
}

fn spawn_reader<R: Read + Send + 'static>(mut r: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = r.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Wait for `child`, killing it once `cancel` fires
fn wait(mut child: Child, cancel: &Cancel) -> Result<(bool, String), GeneratorError> {
    let stdout = child.stdout.take().map(spawn_reader);
    let stderr = child.stderr.take().map(spawn_reader);

    let status = loop {
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GeneratorError::Cancelled);
        }
        if let Some(status) = child.try_wait()? {
            break status;
        }
        thread::sleep(POLL_INTERVAL);
    };

    let mut output = String::new();
    for handle in [stdout, stderr].into_iter().flatten() {
        output.push_str(&handle.join().unwrap_or_default());
    }
    Ok((status.success(), output))
}

/// Lines of the compiler output that are not warnings
fn error_lines(output: &str) -> Vec<&str> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.contains("WARNING"))
        .collect()
}

/// Run `protoc` over every `.proto` file in `proto_dir`
///
/// Returns the post-processed Rust files of the output directories, sorted.
pub fn generate_proto(
    proto_dir: &Path,
    opts: &ProtocOptions,
    cancel: &Cancel,
) -> Result<Vec<PathBuf>, GeneratorError> {
    cancel.check()?;
    let files = files_with_extension(proto_dir, "proto")?;
    if files.is_empty() {
        return Err(GeneratorError::ProtoFilesNotFound {
            dir: proto_dir.display().to_string(),
        });
    }

    let args = opts.args(proto_dir, &files);
    let command = std::iter::once(opts.protoc.display().to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ");
    tracing::debug!(%command, "running protoc");

    let out_dirs = opts.rust_out_dirs();
    let before = snapshot(&out_dirs)?;

    let child = match Command::new(&opts.protoc)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            return Err(GeneratorError::Protoc {
                command,
                output: e.to_string(),
            })
        }
    };
    let (success, output) = wait(child, cancel)?;

    let errors = error_lines(&output);
    if !errors.is_empty() || !success {
        return Err(GeneratorError::Protoc {
            command,
            output: errors.join("\n"),
        });
    }
    for line in output.lines().filter(|l| l.contains("WARNING")) {
        tracing::warn!(line = line.trim(), "protoc");
    }

    // Only files this run created or rewrote are touched
    let mut written = Vec::new();
    for (path, stamp) in snapshot(&out_dirs)? {
        if before.get(&path) == Some(&stamp) {
            continue;
        }
        let source = fs::read_to_string(&path)?;
        fs::write(&path, opts.post_process(&source))?;
        written.push(path);
    }
    tracing::info!(files = written.len(), "protoc finished");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_args() {
        let opts = ProtocOptions {
            include_paths: vec![PathBuf::from("/usr/include")],
            prost_out: PathBuf::from("out"),
            tonic_out: Some(PathBuf::from("out")),
            openapiv2_out: Some(PathBuf::from("api")),
            extra_args: vec!["--experimental_allow_proto3_optional".to_string()],
            ..Default::default()
        };
        let args = opts.args(Path::new("proto"), &[PathBuf::from("proto/store.proto")]);
        assert_eq!(
            args,
            vec![
                "-Iproto",
                "-I/usr/include",
                "--prost_out=out",
                "--tonic_out=out",
                "--openapiv2_out=api",
                "--experimental_allow_proto3_optional",
                "proto/store.proto",
            ]
        );
        assert_eq!(opts.rust_out_dirs(), vec![Path::new("out")]);
    }

    #[test]
    fn test_warnings_are_not_errors() {
        let output = "\nstore.proto: WARNING: Import x is unused.\nstore.proto:3:1: Expected \";\".\n";
        assert_eq!(error_lines(output), vec!["store.proto:3:1: Expected \";\"."]);
    }

    #[test]
    fn test_post_process() {
        let opts = ProtocOptions {
            strip_line_prefixes: vec!["// This file is @generated".to_string()],
            build_tags: vec!["#![cfg(feature = \"proto\")]".to_string()],
            ..Default::default()
        };
        let out = opts.post_process("// This file is @generated by prost-build.\npub struct A {}\n");
        assert_eq!(out, "#![cfg(feature = \"proto\")]\npub struct A {}\n");
        assert_eq!(opts.post_process(&out), out);
    }

    #[test]
    fn test_spawn_failure_names_command() {
        let protos = tempfile::tempdir().unwrap();
        fs::write(protos.path().join("store.proto"), "syntax = \"proto3\";\n").unwrap();
        let out = tempfile::tempdir().unwrap();
        let opts = ProtocOptions {
            protoc: protos.path().join("no-such-protoc"),
            prost_out: out.path().to_path_buf(),
            ..Default::default()
        };
        let err = generate_proto(protos.path(), &opts, &Cancel::new()).unwrap_err();
        match &err {
            GeneratorError::Protoc { command, output } => {
                assert!(command.contains("no-such-protoc"));
                assert!(command.contains("--prost_out="));
                assert!(command.ends_with("store.proto"));
                assert!(!output.is_empty());
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(err.to_string().contains("no-such-protoc"));
    }

    #[test]
    fn test_no_proto_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = generate_proto(dir.path(), &ProtocOptions::default(), &Cancel::new()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = Cancel::new();
        cancel.cancel();
        let err = generate_proto(Path::new("."), &ProtocOptions::default(), &cancel).unwrap_err();
        assert!(err.is_cancelled());
    }
}
