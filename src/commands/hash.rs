use super::{arg, Builtin, CommandError};
use crate::engine::Engine;
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Hash a file in fixed-size chunks and return the lowercase hex digest.
fn digest_file<D: Digest>(path: &Path) -> io::Result<String>
where
    <D as sha2::digest::OutputSizeUser>::OutputSize: std::ops::Add,
    <<D as sha2::digest::OutputSizeUser>::OutputSize as std::ops::Add>::Output:
        sha2::digest::generic_array::ArrayLength<u8>,
{
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// `md5` and `sha256` share one handler; only the digest differs.
pub struct Hash {
    name: &'static str,
    digest: fn(&Path) -> io::Result<String>,
}

impl Hash {
    pub fn md5() -> Self {
        Self {
            name: "md5",
            digest: digest_file::<Md5>,
        }
    }

    pub fn sha256() -> Self {
        Self {
            name: "sha256",
            digest: digest_file::<Sha256>,
        }
    }
}

impl Builtin for Hash {
    fn name(&self) -> &'static str {
        self.name
    }

    fn usage(&self) -> &'static str {
        match self.name {
            "md5" => "md5 <path>",
            _ => "sha256 <path>",
        }
    }

    fn execute(&self, engine: &Engine, args: &[String]) -> Result<String, CommandError> {
        let target = arg(args, 0, self.usage())?;
        let path = engine.resolve_file(target)?;
        let hex = (self.digest)(&path).map_err(|e| CommandError::io("Hash failed", e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(format!("{}  {}", hex, name))
    }
}
