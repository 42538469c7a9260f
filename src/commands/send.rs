use anyhow::{Context, Result};

use crate::cli::SendArgs;
use crate::defaults::Defaults;
use crate::process::{build_message, MacroResolver};
use crate::send::send_transaction;

pub async fn run(args: SendArgs) -> Result<()> {
    let client = args.node.connect()?;
    let opts = args.node.send_opts();
    let mut resolver = MacroResolver::new(
        args.msg.tokenfile.as_deref().unwrap_or(Defaults::TOKEN_CACHE_FILE),
        client.clone(),
        opts.rpc_timeout,
    );

    let (msg, _) = build_message(
        &mut resolver,
        &args.msg.sender,
        &args.msg.receiver,
        &args.msg.value,
        &args.msg.data,
    )
    .await
    .context("preparing transaction")?;

    let passphrase = args.keys.passphrase_source().resolve()?;
    let keystore = args.keys.keystore();

    let out = send_transaction(client.as_ref(), &msg, &passphrase, &keystore, args.sync, &opts)
        .await
        .context("sending transaction")?;

    println!("{:?}", out.hash);
    if let Some(receipt) = out.receipt {
        println!("{}", serde_json::to_string_pretty(&receipt)?);
    }
    Ok(())
}
