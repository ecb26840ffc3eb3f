use std::process;

use log::{error, info};

use flatfs::config::Config;
use flatfs::consts::IMAGE_SIZE;
use flatfs::driver::file_drive::FileDrive;
use flatfs::fuse::filesystem::FuseDriver;
use flatfs::ops::FlatFS;
use flatfs::util::format::pretty_size;

fn main() {
    let config = match Config::from_args(std::env::args_os()) {
        Ok(config) => config,
        Err(e) => e.exit(),
    };

    env_logger::Builder::new()
        .filter_level(config.log_level())
        .parse_env("RUST_LOG")
        .init();

    if let Err(e) = run(&config) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(config: &Config) -> std::io::Result<()> {
    let drive = FileDrive::open(&config.image, IMAGE_SIZE, config.sector_size)?;
    if drive.is_new() {
        info!("created image {}", config.image.display());
    }

    let fs = FlatFS::new(drive)?.with_flush_interval(config.flush_interval);
    let statfs = fs.statfs();
    info!(
        "mounting {} on {} ({} in use)",
        config.image.display(),
        config.mountpoint.display(),
        pretty_size(statfs.used_bytes())
    );

    fuser::mount2(FuseDriver::new(fs), &config.mountpoint, &config.mount_options())
}
