use readxls::{CellValue, Config, ExcelError, Workbook, Worksheet};
use std::fs::File;
use std::io::{self, BufReader, Write};
use tracing_subscriber::prelude::*;

fn usage(me: &str) -> ! {
    eprintln!("Usage:");
    eprintln!("{} <xlsfile>", me);
    eprintln!("  Prints every sheet in <xlsfile> as comma separated rows");
    eprintln!("{} <xlsfile> <sheet>", me);
    eprintln!("  Prints only <sheet>");
    std::process::exit(1);
}

fn csv_field(value: &CellValue) -> String {
    let s = value.to_string();
    if s.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s
    }
}

fn dump_sheet<W: Write>(w: &mut W, sheet: &Worksheet) -> Result<(), io::Error> {
    writeln!(
        w,
        "# {} ({:?}, {}): {} rows, {} columns",
        sheet.name(),
        sheet.sheet_type(),
        sheet.visibility(),
        sheet.row_count(),
        sheet.column_count()
    )?;
    let columns = sheet.stored_columns().unwrap_or(0);
    let mut cells = sheet.cells().peekable();
    for row in 0..sheet.stored_rows().unwrap_or(0) {
        let mut fields = Vec::<String>::new();
        while let Some(cell) = cells.next_if(|c| u32::from(c.row) == row) {
            let col = usize::from(cell.column);
            if fields.len() <= col {
                fields.resize(col + 1, String::new());
            }
            fields[col] = csv_field(&cell.value);
        }
        fields.resize(fields.len().max(columns as usize), String::new());
        writeln!(w, "{}", fields.join(","))?;
    }
    Ok(())
}

fn main() -> Result<(), ExcelError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    if !(2..=3).contains(&args.len()) {
        usage(&args[0]);
    }

    let config = Config::load()?;
    let fname = &args[1];
    let f = match File::open(fname) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Failed to open {}: {}", fname, e);
            std::process::exit(1);
        }
    };
    let workbook = Workbook::from_reader(BufReader::new(f), &config).unwrap_or_else(|e| {
        eprintln!("Failed to parse {}: {}", fname, e);
        std::process::exit(1);
    });
    for anomaly in workbook.anomalies() {
        eprintln!("Anomaly: {anomaly}");
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.get(2) {
        Some(name) => dump_sheet(&mut out, workbook.sheet(name)?)?,
        None => {
            for sheet in workbook.sheets() {
                dump_sheet(&mut out, sheet)?;
                writeln!(out)?;
            }
        }
    }
    Ok(())
}
