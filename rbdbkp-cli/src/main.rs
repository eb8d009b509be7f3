mod backup;
mod restore_point;
mod setup;
mod target;

use proxmox_router::cli::{run_cli_command, CliCommandMap};

fn main() {
    let cmd_def = CliCommandMap::new()
        .insert("backup", backup::backup_commands())
        .insert("restore-point", restore_point::restore_point_commands());

    run_cli_command(
        cmd_def,
        proxmox_router::cli::CliEnvironment::new(),
        Some(|future| proxmox_async::runtime::main(future)),
    );
}
