use dgramprims_batch::{BatchConfig, DEFAULT_BATCH_SIZE};

use crate::cmd::envinfo::active_features;
use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if args.extended {
        for (key, value) in provenance() {
            println!("{key}: {value}");
        }
    } else {
        println!("dgramprims {}", env!("CARGO_PKG_VERSION"));
    }
    Ok(SUCCESS)
}

/// Build provenance plus the batching defaults compiled into this binary.
fn provenance() -> Vec<(&'static str, String)> {
    let defaults = BatchConfig::default();
    let commands = if cfg!(any(target_os = "linux", target_os = "android")) {
        "send, recv, echo, version, doctor, envinfo"
    } else {
        "version, doctor, envinfo"
    };
    vec![
        ("dgramprims", env!("CARGO_PKG_VERSION").to_string()),
        (
            "target",
            option_env!("DGRAMPRIMS_BUILD_TARGET")
                .unwrap_or(std::env::consts::OS)
                .to_string(),
        ),
        (
            "git_hash",
            option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        ),
        ("features", active_features().join(",")),
        ("commands", commands.to_string()),
        ("batch_size", DEFAULT_BATCH_SIZE.to_string()),
        ("resolve_addresses", defaults.resolve_addresses.to_string()),
    ]
}
