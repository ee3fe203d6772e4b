pub fn human_bytes(n: u64) -> String {
    const KB: u64 = 1 << 10;
    const MB: u64 = 1 << 20;
    const GB: u64 = 1 << 30;
    match n {
        n if n >= GB => format!("{:.2} GB", n as f64 / GB as f64),
        n if n >= MB => format!("{:.2} MB", n as f64 / MB as f64),
        n if n >= KB => format!("{:.2} KB", n as f64 / KB as f64),
        n => format!("{n} B"),
    }
}
