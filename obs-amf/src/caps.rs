//! Per-adapter capability table
//!
//! Capabilities are probed out of process so a crashing driver cannot take
//! the host down. The probe prints an INI document:
//!
//! ```text
//! [0]
//! is_amd=true
//! supports_avc=true
//! supports_hevc=true
//! supports_av1=false
//! ```
//!
//! or a single `[error]` section with a `string` key.

use crate::codec::Codec;
use crate::error::{Error, Result};
use crossbeam::channel;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdapterCaps {
    pub is_amd: bool,
    pub supports_avc: bool,
    pub supports_hevc: bool,
    pub supports_av1: bool,
}

impl AdapterCaps {
    pub fn supports(&self, codec: Codec) -> bool {
        match codec {
            Codec::Avc => self.supports_avc,
            Codec::Hevc => self.supports_hevc,
            Codec::Av1 => self.supports_av1,
        }
    }
}

/// Immutable capability facts, indexed by adapter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapsTable {
    adapters: Vec<AdapterCaps>,
}

type Sections<'a> = HashMap<&'a str, HashMap<&'a str, &'a str>>;

fn parse_sections(text: &str) -> Sections<'_> {
    let mut sections: Sections<'_> = HashMap::new();
    let mut current: Option<&str> = None;

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let name = name.trim();
            sections.entry(name).or_default();
            current = Some(name);
        } else if let (Some(section), Some((key, value))) = (current, line.split_once('=')) {
            sections
                .entry(section)
                .or_default()
                .insert(key.trim(), value.trim());
        }
    }

    sections
}

fn ini_bool(section: Option<&HashMap<&str, &str>>, key: &str) -> bool {
    section
        .and_then(|s| s.get(key))
        .map(|v| v.eq_ignore_ascii_case("true") || *v == "1")
        .unwrap_or(false)
}

impl CapsTable {
    pub fn new(adapters: Vec<AdapterCaps>) -> Self {
        CapsTable { adapters }
    }

    /// Build the table from probe output
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Err(Error::Probe("Seems the AMF test subprocess crashed".into()));
        }

        let sections = parse_sections(text);
        if let Some(error) = sections.get("error") {
            let message = error.get("string").copied().unwrap_or("unknown probe error");
            return Err(Error::Probe(message.to_owned()));
        }

        let adapters: Vec<AdapterCaps> = (0..sections.len())
            .map(|i| {
                let section = sections.get(i.to_string().as_str());
                AdapterCaps {
                    is_amd: ini_bool(section, "is_amd"),
                    supports_avc: ini_bool(section, "supports_avc"),
                    supports_hevc: ini_bool(section, "supports_hevc"),
                    supports_av1: ini_bool(section, "supports_av1"),
                }
            })
            .collect();

        let table = CapsTable { adapters };
        if ![Codec::Avc, Codec::Hevc, Codec::Av1]
            .into_iter()
            .any(|codec| table.any_supports(codec))
        {
            return Err(Error::Unsupported(
                "Neither AVC, HEVC, nor AV1 are supported by any devices",
            ));
        }

        Ok(table)
    }

    /// Run the probe executable and parse what it prints
    pub fn probe(exe: &Path, args: &[String], timeout: Duration) -> Result<Self> {
        let mut child = Command::new(exe)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Probe(format!("Failed to launch the AMF test process: {}", e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Probe("AMF test process has no stdout".into()))?;

        let (tx, rx) = channel::bounded(1);
        std::thread::spawn(move || {
            let mut out = String::new();
            let _ = stdout.read_to_string(&mut out);
            let _ = tx.send(out);
        });

        let output = match rx.recv_timeout(timeout) {
            Ok(out) => out,
            Err(_) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::Probe("AMF test process timed out".into()));
            }
        };
        let _ = child.wait();

        log::debug!("AMF test output:\n{}", output);
        Self::parse(&output)
    }

    pub fn adapter(&self, index: usize) -> Option<&AdapterCaps> {
        self.adapters.get(index)
    }

    pub fn supports(&self, adapter: usize, codec: Codec) -> bool {
        self.adapter(adapter).is_some_and(|caps| caps.supports(codec))
    }

    pub fn any_supports(&self, codec: Codec) -> bool {
        self.adapters.iter().any(|caps| caps.supports(codec))
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Render the table the way the probe prints it
    pub fn to_ini(&self) -> String {
        let mut out = String::new();
        for (i, caps) in self.adapters.iter().enumerate() {
            out.push_str(&format!("[{}]\n", i));
            out.push_str(&format!("is_amd={}\n", caps.is_amd));
            out.push_str(&format!("supports_avc={}\n", caps.supports_avc));
            out.push_str(&format!("supports_hevc={}\n", caps.supports_hevc));
            out.push_str(&format!("supports_av1={}\n", caps.supports_av1));
        }
        out
    }
}

/// Probe output for a failure
pub fn error_ini(message: &str) -> String {
    format!("[error]\nstring={}\n", message)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_ADAPTERS: &str = "\
[0]
is_amd=true
supports_avc=true
supports_hevc=true
supports_av1=false
[1]
is_amd=false
supports_avc=false
supports_hevc=false
supports_av1=false
";

    #[test]
    fn test_parse_adapters() {
        let table = CapsTable::parse(TWO_ADAPTERS).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.supports(0, Codec::Avc));
        assert!(table.supports(0, Codec::Hevc));
        assert!(!table.supports(0, Codec::Av1));
        assert!(!table.supports(1, Codec::Avc));
        assert!(!table.supports(5, Codec::Avc));
        assert!(table.adapter(0).unwrap().is_amd);
    }

    #[test]
    fn test_parse_error_section() {
        let err = CapsTable::parse(&error_ini("Not running AMD proprietary driver")).unwrap_err();
        assert_eq!(err.to_string(), "Not running AMD proprietary driver");
    }

    #[test]
    fn test_parse_empty_output() {
        let err = CapsTable::parse("   \n").unwrap_err();
        assert!(err.to_string().starts_with("Seems the AMF test subprocess crashed"));
    }

    #[test]
    fn test_no_codec_anywhere() {
        let text = "[0]\nis_amd=true\nsupports_avc=false\n";
        let err = CapsTable::parse(text).unwrap_err();
        assert_eq!(err.to_string(), "Neither AVC, HEVC, nor AV1 are supported by any devices");
        assert_eq!(err.kind(), crate::error::ErrorKind::Environment);
    }

    #[test]
    fn test_ini_output_parses_back() {
        let table = CapsTable::new(vec![AdapterCaps {
            is_amd: true,
            supports_avc: true,
            supports_hevc: false,
            supports_av1: true,
        }]);
        assert_eq!(CapsTable::parse(&table.to_ini()).unwrap(), table);
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_subprocess() {
        let args = vec!["-c".to_string(), "printf '[0]\\nsupports_av1=true\\n'".to_string()];
        let table = CapsTable::probe(Path::new("/bin/sh"), &args, Duration::from_secs(5)).unwrap();
        assert!(table.supports(0, Codec::Av1));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_timeout() {
        let args = vec!["-c".to_string(), "sleep 5".to_string()];
        let err = CapsTable::probe(Path::new("/bin/sh"), &args, Duration::from_millis(100)).unwrap_err();
        assert_eq!(err.to_string(), "AMF test process timed out");
    }
}
