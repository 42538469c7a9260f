use anyhow::{bail, Context, Result};

use crate::cli::BatchStatusArgs;
use crate::entry::open_read_writer;
use crate::process::batch_status;

pub async fn run(args: BatchStatusArgs) -> Result<()> {
    if !args.batchfile.exists() {
        bail!("batch file {} does not exist", args.batchfile.display());
    }
    let client = args.node.connect()?;
    let opts = args.node.send_opts();

    let mut rw = open_read_writer(&args.batchfile, &args.sheet)
        .with_context(|| format!("opening {}", args.batchfile.display()))?;
    let entries = rw.read_all().context("reading batch file")?;

    let outcomes = batch_status(entries, client.as_ref(), &opts, &mut *rw).await?;
    println!("{}", serde_json::to_string_pretty(&outcomes)?);
    Ok(())
}
