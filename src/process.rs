use std::sync::Arc;
use std::time::Duration;

use ethers_core::types::H256;
use tracing::{error, info, warn};

use crate::entry::{EntryWriter, Locator, FIELD_HASH, FIELD_STATUS};
use crate::error::{BatchError, ProcessError, ValidationError};
use crate::keystore::Keystore;
use crate::macros::{MacroInterpreter, ResolvedMacro};
use crate::passphrase::PassphraseSource;
use crate::rpc::LedgerClient;
use crate::send::{fetch_receipt, send_transaction, SendOpts};
use crate::token::TokenRegistry;
use crate::types::{BatchEntryOut, CallMessage, EntryOutcome, Payload, TransactionParams};
use crate::util::check_arguments;

/// Options for the batch sender subcommand
#[derive(Clone, Debug, Default)]
pub struct BatchOpts {
    /// First entry to send (inclusive).
    pub begin: usize,
    /// One past the last entry to send; 0 means "all".
    pub end: usize,
    pub send: SendOpts,
}

/// Keep entries `[begin, end)`; `end == 0` selects up to the last entry.
pub fn select_entries(
    mut entries: Vec<TransactionParams>,
    begin: usize,
    end: usize,
) -> Result<Vec<TransactionParams>, BatchError> {
    let len = entries.len();
    let end = if end == 0 { len } else { end };
    if begin >= end || end > len {
        return Err(BatchError::InvalidBatchIndex { begin, end, len });
    }
    entries.truncate(end);
    Ok(entries.split_off(begin))
}

/// Builds the macro interpreter on first use, loading the token list then.
pub struct MacroResolver {
    token_file: String,
    client: Arc<dyn LedgerClient>,
    call_timeout: Duration,
    interpreter: Option<MacroInterpreter>,
}

impl MacroResolver {
    pub fn new(token_file: &str, client: Arc<dyn LedgerClient>, call_timeout: Duration) -> Self {
        Self {
            token_file: token_file.to_string(),
            client,
            call_timeout,
            interpreter: None,
        }
    }

    /// Use an already-loaded registry instead of reading the token file.
    pub fn with_registry(mut self, tokens: TokenRegistry) -> Result<Self, ProcessError> {
        self.interpreter = Some(self.build(tokens)?);
        Ok(self)
    }

    fn build(&self, tokens: TokenRegistry) -> Result<MacroInterpreter, ProcessError> {
        Ok(MacroInterpreter::new(tokens)?.with_client(self.client.clone(), self.call_timeout))
    }

    pub async fn resolve(
        &mut self,
        input: &str,
        sender: &str,
        receiver: &str,
    ) -> Result<ResolvedMacro, ProcessError> {
        let interp = match self.interpreter.take() {
            Some(interp) => interp,
            None => self.build(TokenRegistry::load(&self.token_file)?)?,
        };
        let interp = self.interpreter.insert(interp);
        Ok(interp.parse(input, sender, receiver).await?)
    }
}

/// Validate the textual fields and turn a macro payload into a contract call.
pub async fn build_message(
    resolver: &mut MacroResolver,
    from: &str,
    to: &str,
    value: &str,
    data: &str,
) -> Result<(CallMessage, Option<ResolvedMacro>), ProcessError> {
    let payload = Payload::parse(data).map_err(|e| ValidationError::Payload(e.to_string()))?;
    let mut msg = check_arguments(from, to, value, &payload)?;

    let resolved = match &payload {
        Payload::Macro(instruction) => {
            let r = resolver.resolve(instruction, from, to).await?;
            msg.to = Some(r.contract);
            msg.data = r.payload.clone();
            Some(r)
        }
        Payload::Raw(_) => None,
    };
    Ok((msg, resolved))
}

async fn process_entry(
    entry: &TransactionParams,
    client: &dyn LedgerClient,
    keystore: &dyn Keystore,
    resolver: &mut MacroResolver,
    passphrase: &mut PassphraseSource,
    opts: &SendOpts,
) -> Result<H256, ProcessError> {
    let (msg, _) = build_message(
        resolver,
        &entry.from,
        &entry.to,
        &entry.value.to_string(),
        &entry.data,
    )
    .await?;

    let shared;
    let pass = match &entry.passphrase {
        Some(p) => p.as_str(),
        None => {
            shared = passphrase.resolve()?;
            shared.as_str()
        }
    };

    // never wait during batch sending
    let out = send_transaction(client, &msg, pass, keystore, false, opts).await?;
    Ok(out.hash)
}

fn annotate<W: EntryWriter + ?Sized>(writer: &mut W, record: usize, field: usize, value: &str) {
    if let Err(e) = writer.write_string(Locator { record, field }, value) {
        error!(record, field, error = %e, "failed to annotate batch file");
    }
}

fn flush_annotations<W: EntryWriter + ?Sized>(writer: Option<&mut W>) -> Result<(), BatchError> {
    match writer {
        Some(w) => w.flush().map_err(BatchError::Annotate),
        None => Ok(()),
    }
}

fn log_summary(outcomes: &[BatchEntryOut]) {
    let submitted = outcomes.iter().filter(|o| o.outcome.is_submitted()).count();
    let skipped = outcomes
        .iter()
        .filter(|o| matches!(o.outcome, EntryOutcome::Skipped { .. }))
        .count();
    info!(
        total = outcomes.len(),
        submitted,
        skipped,
        failed = outcomes.len() - submitted - skipped,
        "batch finished"
    );
}

/// Send `entries[begin..end]` one by one. A failing entry is logged and
/// recorded; the rest of the batch still goes out.
///
/// With an annotator every submitted hash is written back to its record and
/// entries that already carry a hash are skipped. The annotator is flushed
/// exactly once, whatever happened in between.
pub async fn send_batch<W: EntryWriter + ?Sized>(
    entries: Vec<TransactionParams>,
    client: &dyn LedgerClient,
    keystore: &dyn Keystore,
    resolver: &mut MacroResolver,
    passphrase: &mut PassphraseSource,
    opts: &BatchOpts,
    mut annotator: Option<&mut W>,
) -> Result<Vec<BatchEntryOut>, BatchError> {
    let entries = select_entries(entries, opts.begin, opts.end)?;
    info!(count = entries.len(), begin = opts.begin, "sending batch");

    let mut outcomes = Vec::with_capacity(entries.len());
    for entry in &entries {
        let outcome = if annotator.is_some() && entry.hash.is_some() {
            warn!(record = entry.record, "entry already carries a hash, skipping");
            EntryOutcome::Skipped {
                reason: "already submitted".into(),
            }
        } else {
            match process_entry(entry, client, keystore, resolver, passphrase, &opts.send).await {
                Ok(hash) => {
                    if let Some(w) = annotator.as_deref_mut() {
                        annotate(w, entry.record, FIELD_HASH, &format!("{hash:?}"));
                    }
                    EntryOutcome::Submitted {
                        hash: format!("{hash:?}"),
                    }
                }
                Err(ProcessError::Registry(e)) => {
                    error!(error = %e, "token registry unavailable, aborting batch");
                    flush_annotations(annotator)?;
                    return Err(BatchError::Registry(e));
                }
                Err(e) => {
                    error!(record = entry.record, from = %entry.from, error = %e, "batch entry failed");
                    EntryOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        };
        outcomes.push(BatchEntryOut {
            record: entry.record,
            from: entry.from.clone(),
            outcome,
        });
    }

    flush_annotations(annotator)?;
    log_summary(&outcomes);
    Ok(outcomes)
}

/// Look up the receipt of every recorded hash once and write the mined
/// status back to the record. Flushes the writer at the end in all cases.
pub async fn batch_status<W: EntryWriter + ?Sized>(
    entries: Vec<TransactionParams>,
    client: &dyn LedgerClient,
    opts: &SendOpts,
    writer: &mut W,
) -> Result<Vec<BatchEntryOut>, BatchError> {
    let mut outcomes = Vec::with_capacity(entries.len());
    for entry in &entries {
        let outcome = match entry.hash {
            None => EntryOutcome::Skipped {
                reason: "no transaction hash recorded".into(),
            },
            Some(hash) => match fetch_receipt(client, hash, opts).await {
                Ok(Some(receipt)) => {
                    let success = receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false);
                    annotate(writer, entry.record, FIELD_STATUS, &success.to_string());
                    EntryOutcome::Mined {
                        hash: format!("{hash:?}"),
                        success,
                    }
                }
                Ok(None) => EntryOutcome::Pending {
                    hash: format!("{hash:?}"),
                },
                Err(e) => {
                    error!(record = entry.record, error = %e, "receipt lookup failed");
                    EntryOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            },
        };
        outcomes.push(BatchEntryOut {
            record: entry.record,
            from: entry.from.clone(),
            outcome,
        });
    }
    writer.flush().map_err(BatchError::Annotate)?;
    Ok(outcomes)
}
