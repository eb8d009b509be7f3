use std::time::Duration;

use rbdbkp_api_types::Vm;

use crate::context::Context;
use crate::error::BackupError;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Ask the hypervisor to create `snapshot_name` on `vm`, then wait until
/// that name has propagated to every RBD image behind `vm.rbd_disks` on the
/// source cluster (spec §4.5). No disk's stream may start before its own
/// snapshot is observed, so this returns only once all of them have
/// converged.
pub async fn create_and_converge(
    ctx: &Context,
    vm: &Vm,
    snapshot_name: &str,
    description: &str,
) -> Result<(), BackupError> {
    ctx.hypervisor
        .create_snapshot(&vm.node, vm.id, snapshot_name, description)
        .await?;

    for disk in &vm.rbd_disks {
        let image = disk.to_block_image();
        wait_for_snapshot(ctx, &image.pool, &image.image, snapshot_name).await?;
    }

    Ok(())
}

async fn wait_for_snapshot(
    ctx: &Context,
    pool: &str,
    image: &str,
    name: &str,
) -> Result<(), BackupError> {
    let tries = ctx.config.global.wait_for_snapshot_tries;
    for attempt in 0..tries {
        let found = ctx
            .source
            .list_snapshots_by_prefix(pool, image, name, Some(&ctx.source_shell))
            .await?;
        if found.iter().any(|s| s.name == name) {
            return Ok(());
        }
        if attempt + 1 < tries {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
    Err(BackupError::ConvergenceTimeout {
        what: format!("snapshot {pool}/{image}@{name} on source cluster"),
        tries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_interval_is_one_second() {
        assert_eq!(POLL_INTERVAL, Duration::from_secs(1));
    }
}
