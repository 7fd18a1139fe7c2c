use hpcontract_runtime::{BoxError, ContractConfig, ContractContext, HotPocketContract};
use tracing::info;

use crate::cmd::{runtime, EchoArgs};
use crate::exit::{init_error, CliResult, SUCCESS};

pub fn run(args: EchoArgs) -> CliResult<i32> {
    let contract = HotPocketContract::with_config(ContractConfig {
        protocol: args.protocol,
        force_terminate: args.force_terminate,
        patch_config: args.patch_config,
    });

    runtime()?
        .block_on(contract.init(echo_contract))
        .map_err(|err| init_error("contract init failed", err))?;
    Ok(SUCCESS)
}

/// Send every user's inputs straight back to them.
async fn echo_contract(ctx: ContractContext) -> Result<(), BoxError> {
    info!(
        readonly = ctx.readonly(),
        users = ctx.users().count(),
        "echo contract started"
    );

    for user in ctx.users().list() {
        for input in ctx.users().read_inputs(user).await? {
            info!(user = user.public_key(), size = input.len(), "echoing input");
            user.send(input).await?;
        }
    }
    Ok(())
}
