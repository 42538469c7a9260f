use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::cli::SendBatchArgs;
use crate::defaults::Defaults;
use crate::entry::{open_read_writer, open_reader, EntryWriter};
use crate::process::{send_batch, BatchOpts, MacroResolver};
use crate::report::write_batch_report;

/// Ask for the batch file on the console when it was not given as a flag.
fn prompt_batch_file() -> Result<PathBuf> {
    eprint!("Batchfile path: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let path = line.trim();
    if path.is_empty() {
        bail!("no batch file given");
    }
    Ok(PathBuf::from(path))
}

pub async fn run(args: SendBatchArgs) -> Result<()> {
    let path = match args.batchfile {
        Some(p) => p,
        None => prompt_batch_file()?,
    };
    if !path.exists() {
        bail!("batch file {} does not exist", path.display());
    }

    let client = args.node.connect()?;
    let opts = BatchOpts {
        begin: args.batchstart,
        end: args.batchend,
        send: args.node.send_opts(),
    };
    let keystore = args.keys.keystore();
    let mut passphrase = args.keys.passphrase_source();
    let mut resolver = MacroResolver::new(
        args.tokenfile.as_deref().unwrap_or(Defaults::TOKEN_CACHE_FILE),
        client.clone(),
        opts.send.rpc_timeout,
    );

    let outcomes = if args.annotate {
        let mut rw = open_read_writer(&path, &args.sheet)
            .with_context(|| format!("opening {}", path.display()))?;
        let entries = rw.read_all().context("reading batch file")?;
        send_batch(
            entries,
            client.as_ref(),
            &keystore,
            &mut resolver,
            &mut passphrase,
            &opts,
            Some(&mut *rw),
        )
        .await?
    } else {
        let entries = open_reader(&path, &args.sheet)
            .with_context(|| format!("opening {}", path.display()))?
            .read_all()
            .context("reading batch file")?;
        send_batch::<dyn EntryWriter>(
            entries,
            client.as_ref(),
            &keystore,
            &mut resolver,
            &mut passphrase,
            &opts,
            None,
        )
        .await?
    };

    if let Some(out) = args.out {
        let written = write_batch_report(&out, &outcomes, true)?;
        println!("✓ Wrote {}", written.display());
    }
    Ok(())
}
