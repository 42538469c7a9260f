use anyhow::{Context, Result};

use crate::abi::load_abi;
use crate::cli::CallArgs;
use crate::defaults::Defaults;
use crate::decoder::{decode_uint_output, format_token_amount};
use crate::macros::MacroKind;
use crate::process::{build_message, MacroResolver};
use crate::send::call;
use crate::util::bytes_to_0x;

pub async fn run(args: CallArgs) -> Result<()> {
    let client = args.node.connect()?;
    let opts = args.node.send_opts();
    let mut resolver = MacroResolver::new(
        args.msg.tokenfile.as_deref().unwrap_or(Defaults::TOKEN_CACHE_FILE),
        client.clone(),
        opts.rpc_timeout,
    );

    let (msg, resolved) = build_message(
        &mut resolver,
        &args.msg.sender,
        &args.msg.receiver,
        &args.msg.value,
        &args.msg.data,
    )
    .await
    .context("preparing call")?;

    let result = call(client.as_ref(), &msg, &opts).await.context("calling contract")?;

    match resolved {
        Some(m) if m.kind == MacroKind::BalanceOf => {
            let abi = load_abi()?;
            let balance = decode_uint_output(abi.function("balanceOf")?, &result)
                .context("decoding balanceOf result")?;
            println!("{}", format_token_amount(balance, m.decimals)?);
        }
        _ => println!("Result={}", bytes_to_0x(&result)),
    }
    Ok(())
}
