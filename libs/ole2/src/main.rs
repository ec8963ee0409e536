use ole2::{Ole, OleEntry};
use std::fs::File;
use std::io::{self, BufReader, Write};
use tracing_subscriber::prelude::*;

type Doc = Ole<BufReader<File>>;

fn usage(me: &str) -> ! {
    eprintln!("Usage:");
    eprintln!("{me} <olefile>");
    eprintln!("  Prints the header summary and the directory tree of <olefile>");
    eprintln!("{me} <olefile> <entry>");
    eprintln!("  Prints the directory entry <entry> (a / separated path)");
    eprintln!("{me} <olefile> <stream> <output|->");
    eprintln!("  Writes the content of <stream> to <output> or to stdout");
    eprintln!("{me} <olefile> --check");
    eprintln!("  Reads every stream and reports the broken ones");
    std::process::exit(1);
}

fn print_anomalies(title: &str, anomalies: &[String]) {
    if anomalies.is_empty() {
        return;
    }
    eprintln!("{title}");
    for an in anomalies {
        eprintln!("  - {an}");
    }
}

fn list(ole: &Doc) {
    let (major, minor) = ole.version();
    println!(
        "Compound File v{major}.{minor}, {} byte sectors, {} directory entries",
        ole.sector_size(),
        ole.num_entries()
    );
    print_anomalies("Header defects:", ole.anomalies());
    for (path, entry) in ole.ftw() {
        let kind = if entry.is_storage() { "storage" } else { "stream" };
        println!("{:>5} [{kind:<7}] {:>10} {path}", entry.id, entry.size);
    }
}

fn check(ole: &Doc) -> i32 {
    print_anomalies("Header defects:", ole.anomalies());
    let mut broken = 0;
    for (path, entry) in ole.ftw() {
        if !entry.is_storage() {
            match ole.read_stream(entry) {
                Ok(data) => eprintln!("{path}: {} bytes OK", data.len()),
                Err(e) => {
                    broken += 1;
                    eprintln!("{path}: {e}");
                }
            }
        }
        print_anomalies(&format!("{path}: entry defects:"), &entry.anomalies);
    }
    i32::from(broken > 0)
}

fn show(entry: &OleEntry) {
    println!("Entry #{} \"{}\"", entry.id, entry.name);
    println!("  type:     {}", entry.objtype);
    println!("  color:    {}", entry.color);
    println!("  size:     {}", entry.size);
    println!("  created:  {:?}", entry.ctime);
    println!("  modified: {:?}", entry.mtime);
    print_anomalies("  defects:", &entry.anomalies);
}

fn extract(ole: &Doc, entry: &OleEntry, to: &str) -> Result<(), io::Error> {
    let data = ole.read_stream(entry)?;
    if to == "-" {
        let mut out = io::stdout().lock();
        out.write_all(&data)?;
        out.flush()
    } else {
        File::create(to)?.write_all(&data)
    }
}

fn main() -> Result<(), io::Error> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (fname, rest) = match args.as_slice() {
        [_, fname, rest @ ..] if rest.len() <= 2 => (fname, rest),
        _ => usage(&args[0]),
    };
    let f = File::open(fname).map_err(|e| {
        eprintln!("Failed to open {fname}: {e}");
        e
    })?;
    let ole = Ole::new(BufReader::new(f)).map_err(|e| {
        eprintln!("{fname} is not a valid compound file: {e}");
        e
    })?;

    match rest {
        [] => list(&ole),
        [flag] if flag == "--check" => std::process::exit(check(&ole)),
        [name, output @ ..] => {
            let entry = ole.get_entry_by_name(name).map_err(|e| {
                eprintln!("Entry {name:?}: {e}");
                e
            })?;
            match output.first() {
                None => show(entry),
                Some(to) => extract(&ole, entry, to)?,
            }
        }
    }
    Ok(())
}
