use std::ffi::OsString;
use std::path::PathBuf;

use clap::{value_t, App, Arg, ArgMatches};
use fuser::MountOption;
use log::LevelFilter;

use crate::consts::DEFAULT_SECTOR_SIZE;

const DEFAULT_FLUSH_INTERVAL: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub image: PathBuf,
    pub mountpoint: PathBuf,
    pub sector_size: usize,
    pub flush_interval: u32,
    pub auto_unmount: bool,
    pub allow_root: bool,
    pub verbosity: u64,
}

fn app<'a, 'b>() -> App<'a, 'b> {
    App::new("flatfs")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Mounts a 1 MiB single-directory filesystem image through FUSE")
        .arg(Arg::with_name("image").index(1).required(true).help("Image file, created when missing"))
        .arg(Arg::with_name("mountpoint").index(2).required(true).help("Directory to mount on"))
        .arg(
            Arg::with_name("sector-size")
                .short("s")
                .long("sector-size")
                .takes_value(true)
                .value_name("BYTES")
                .help("Sector size used to access the image"),
        )
        .arg(
            Arg::with_name("flush-interval")
                .long("flush-interval")
                .takes_value(true)
                .value_name("OPS")
                .help("Write the image back after this many changes, 0 waits for fsync or unmount"),
        )
        .arg(Arg::with_name("auto-unmount").long("auto-unmount").help("Unmount when the process exits"))
        .arg(Arg::with_name("allow-root").long("allow-root").help("Let root access the mount"))
        .arg(Arg::with_name("verbose").short("v").multiple(true).help("Log more, repeat for more detail"))
}

impl Config {
    pub fn from_args<I, T>(args: I) -> clap::Result<Config>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Config::from_matches(&app().get_matches_from_safe(args)?)
    }

    fn from_matches(matches: &ArgMatches) -> clap::Result<Config> {
        let sector_size = if matches.is_present("sector-size") {
            value_t!(matches, "sector-size", usize)?
        } else {
            DEFAULT_SECTOR_SIZE
        };
        let flush_interval = if matches.is_present("flush-interval") {
            value_t!(matches, "flush-interval", u32)?
        } else {
            DEFAULT_FLUSH_INTERVAL
        };

        Ok(Config {
            image: PathBuf::from(matches.value_of_os("image").unwrap_or_default()),
            mountpoint: PathBuf::from(matches.value_of_os("mountpoint").unwrap_or_default()),
            sector_size,
            flush_interval,
            auto_unmount: matches.is_present("auto-unmount"),
            allow_root: matches.is_present("allow-root"),
            verbosity: matches.occurrences_of("verbose"),
        })
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    pub fn mount_options(&self) -> Vec<MountOption> {
        let mut options = vec![MountOption::FSName("flatfs".to_string()), MountOption::RW];
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if self.allow_root {
            options.push(MountOption::AllowRoot);
        }
        options
    }
}
