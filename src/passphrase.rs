use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::defaults::Defaults;
use crate::error::ProcessError;

/// Where the shared keyfile passphrase comes from, in priority order:
/// `--password`, `--passwordfile`, then an interactive prompt.
/// Resolved lazily and at most once.
pub struct PassphraseSource {
    flag: Option<Zeroizing<String>>,
    file: Option<PathBuf>,
    cached: Option<Zeroizing<String>>,
}

impl PassphraseSource {
    pub fn new(flag: Option<String>, file: Option<PathBuf>) -> Self {
        Self {
            flag: flag.filter(|p| !p.is_empty()).map(Zeroizing::new),
            file,
            cached: None,
        }
    }

    /// A source that never prompts.
    pub fn fixed(passphrase: &str) -> Self {
        Self::new(Some(passphrase.to_string()), None)
    }

    pub fn resolve(&mut self) -> Result<Zeroizing<String>, ProcessError> {
        if let Some(p) = &self.cached {
            return Ok(p.clone());
        }
        let p = self.lookup()?;
        self.cached = Some(p.clone());
        Ok(p)
    }

    fn lookup(&self) -> Result<Zeroizing<String>, ProcessError> {
        if let Some(p) = &self.flag {
            return Ok(p.clone());
        }
        if let Some(path) = &self.file {
            let content = Zeroizing::new(fs::read_to_string(path).map_err(|e| {
                ProcessError::Passphrase(format!("reading {}: {e}", path.display()))
            })?);
            return Ok(Zeroizing::new(content.trim_end_matches(['\r', '\n']).to_string()));
        }
        let stdin = io::stdin();
        prompt(&mut stdin.lock(), &mut io::stderr())
    }
}

/// Ask for a passphrase on `output`, reading lines from `input`.
pub fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<Zeroizing<String>, ProcessError> {
    let io_err = |e: io::Error| ProcessError::Passphrase(e.to_string());

    for _ in 0..Defaults::PASSPHRASE_ATTEMPTS {
        write!(output, "Passphrase: ").map_err(io_err)?;
        output.flush().map_err(io_err)?;

        let mut line = Zeroizing::new(String::new());
        if input.read_line(&mut line).map_err(io_err)? == 0 {
            return Err(ProcessError::Passphrase("no passphrase entered".into()));
        }
        let entered = line.trim_end_matches(['\r', '\n']);
        if entered.chars().count() >= Defaults::MIN_PASSPHRASE_LEN {
            return Ok(Zeroizing::new(entered.to_string()));
        }
        writeln!(
            output,
            "Password must have at least {} characters",
            Defaults::MIN_PASSPHRASE_LEN
        )
        .map_err(io_err)?;
    }
    Err(ProcessError::Passphrase(format!(
        "no valid passphrase after {} attempts",
        Defaults::PASSPHRASE_ATTEMPTS
    )))
}
