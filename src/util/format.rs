const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;

/// Human readable byte count, as used in the mount log lines.
pub fn pretty_size(bytes: u64) -> String {
    if bytes < KIB {
        format!("{} B", bytes)
    } else if bytes < MIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    }
}
