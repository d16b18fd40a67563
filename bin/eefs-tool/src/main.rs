use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use eefs_core::{Region, ERASED, FORMAT_IMAGE};
use eefs_counter::WearLevelCounter;
use eefs_mem::{fs_image, RamMedium, SharedMedium};
use eefs_records::{IdMask, RecordStore};
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
#[command(about = "Drive the wear-leveled counter and record store on an EEPROM image")]
struct Cli {
    #[arg(long, default_value = "eeprom.bin")] image: PathBuf,
    #[arg(long, default_value_t = 1024)] size: u32,
    /// Start of the counter region [default: size - counter-len]
    #[arg(long)] counter_at: Option<u32>,
    #[arg(long, default_value_t = 32)] counter_len: u32,
    #[command(subcommand)] cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Start from a blank part: write the store header and a zero counter
    Format,
    /// Hex dump of the image
    Dump,
    /// Run increments on a scratch copy and report how erases spread
    Wear {
        #[arg(default_value_t = 10_000)] increments: u32,
    },
    #[command(subcommand)]
    Counter(CounterCmd),
    #[command(subcommand)]
    Record(RecordCmd),
    #[command(subcommand)]
    Id(IdCmd),
}

#[derive(Subcommand)]
enum CounterCmd {
    Read,
    Inc {
        #[arg(long, default_value_t = 1)] times: u32,
    },
    Reset {
        #[arg(value_parser = parse_u32)] value: u32,
    },
    /// Startup consistency check
    Check,
    /// Startup check after an unclean shutdown
    Recover,
}

#[derive(Subcommand)]
enum RecordCmd {
    Put {
        #[arg(value_parser = parse_u8)] key: u8,
        /// Payload as hex, e.g. 0a0b0c
        data: String,
    },
    Get {
        #[arg(value_parser = parse_u8)] key: u8,
    },
}

#[derive(Subcommand)]
enum IdCmd {
    Add {
        #[arg(value_parser = parse_u8)] list: u8,
        #[arg(value_parser = parse_u32)] id: u32,
    },
    Query {
        #[arg(value_parser = parse_u8)] list: u8,
        #[arg(value_parser = parse_u32)] id: u32,
        #[arg(long)] partial24: bool,
    },
    Delete {
        #[arg(value_parser = parse_u8)] list: u8,
        #[arg(value_parser = parse_u32)] id: u32,
        /// Ignore byte 1
        #[arg(long, conflicts_with = "partial24")] partial8: bool,
        /// Ignore byte 3
        #[arg(long)] partial24: bool,
    },
    List {
        #[arg(value_parser = parse_u8)] list: u8,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let counter_at = cli.counter_at.unwrap_or(cli.size.saturating_sub(cli.counter_len));
    if counter_at as u64 + cli.counter_len as u64 > cli.size as u64 {
        bail!("counter region {:#06x}+{} does not fit in {} bytes", counter_at, cli.counter_len, cli.size);
    }
    let records = Region::new(0, counter_at);

    let mem = match cli.cmd {
        Cmd::Format => RamMedium::new(cli.size),
        _ => fs_image::load_image(&cli.image, cli.size)
            .with_context(|| format!("loading {}", cli.image.display()))?,
    };

    match cli.cmd {
        Cmd::Dump => {
            dump(&mem, records);
            return Ok(());
        }
        Cmd::Wear { increments } => return simulate_wear(mem, counter_at, cli.counter_len, increments),
        _ => {}
    }

    let shared = SharedMedium::new(mem);
    let mut counter = WearLevelCounter::new(shared.clone(), counter_at, cli.counter_len);
    let mut store = RecordStore::open(shared.clone(), records)?;

    match cli.cmd {
        Cmd::Format => {
            counter.begin(false)?;
            info!("formatted {} ({} bytes, counter at {:#06x})", cli.image.display(), cli.size, counter_at);
        }
        Cmd::Counter(cmd) => run_counter(&mut counter, cmd)?,
        Cmd::Record(cmd) => run_record(&mut store, cmd)?,
        Cmd::Id(cmd) => run_id(&mut store, cmd)?,
        Cmd::Dump | Cmd::Wear { .. } => unreachable!(),
    }

    shared.with(|m| fs_image::save_image(&cli.image, m))
        .with_context(|| format!("saving {}", cli.image.display()))?;
    Ok(())
}

fn run_counter(counter: &mut WearLevelCounter<SharedMedium<RamMedium>>, cmd: CounterCmd) -> anyhow::Result<()> {
    match cmd {
        CounterCmd::Read => println!("{}", counter.read()?),
        CounterCmd::Inc { times } => {
            let mut value = counter.read()?;
            for _ in 0..times {
                value = counter.increment()?;
            }
            println!("{}", value);
        }
        CounterCmd::Reset { value } => println!("{}", counter.resetcount(value)?),
        CounterCmd::Check => {
            counter.begin(false)?;
            println!("{}", counter.read()?);
        }
        CounterCmd::Recover => {
            counter.begin(true)?;
            println!("{}", counter.read()?);
        }
    }
    Ok(())
}

fn run_record(store: &mut RecordStore<SharedMedium<RamMedium>>, cmd: RecordCmd) -> anyhow::Result<()> {
    match cmd {
        RecordCmd::Put { key, data } => {
            let bytes = parse_hex(&data)?;
            if !store.update_record(key, &bytes)? {
                bail!("record {:#04x} not stored (region full or payload longer than existing)", key);
            }
        }
        RecordCmd::Get { key } => match store.read_record(key)? {
            Some(data) => println!("{}", hex(&data)),
            None => bail!("record {:#04x} not found", key),
        },
    }
    Ok(())
}

fn run_id(store: &mut RecordStore<SharedMedium<RamMedium>>, cmd: IdCmd) -> anyhow::Result<()> {
    match cmd {
        IdCmd::Add { list, id } => println!("{}", store.add_id(id, list)?),
        IdCmd::Query { list, id, partial24 } => println!("{}", store.query_id(id, list, partial24)?),
        IdCmd::Delete { list, id, partial8, partial24 } => {
            let mask = match (partial8, partial24) {
                (true, _) => IdMask::SkipByte1,
                (_, true) => IdMask::Low24,
                _ => IdMask::Exact,
            };
            println!("{}", store.delete_id_matching(id, list, mask)?);
        }
        IdCmd::List { list } => {
            store.enumerate_ids(list, |id| println!("{:#010x}", id))?;
        }
    }
    Ok(())
}

fn dump(mem: &RamMedium, records: Region) {
    for (row, chunk) in mem.as_bytes().chunks(16).enumerate() {
        let base = row * 16;
        let cells: Vec<String> = chunk.iter().enumerate().map(|(i, &b)| {
            let addr = (base + i) as u32;
            let text = format!("{:02x}", b);
            if b == ERASED {
                text.dimmed().to_string()
            } else if records.contains(addr) && addr - records.start < FORMAT_IMAGE.len() as u32 {
                text.cyan().to_string()
            } else if !records.contains(addr) {
                text.yellow().to_string()
            } else {
                text
            }
        }).collect();
        println!("{:06x}  {}", base, cells.join(" "));
    }
}

fn simulate_wear(mem: RamMedium, counter_at: u32, len: u32, increments: u32) -> anyhow::Result<()> {
    let mut counter = WearLevelCounter::new(mem, counter_at, len);
    counter.begin(false)?;
    counter.medium_mut().reset_wear();

    let start = counter.read()?;
    for _ in 0..increments {
        counter.increment()?;
    }
    let end = counter.read()?;

    let mem = counter.medium();
    let span = counter.start()..counter.start() + counter.len();
    let erases: Vec<u32> = span.map(|a| mem.wear(a).erases).collect();
    let min = erases.iter().copied().min().unwrap_or(0);
    let max = erases.iter().copied().max().unwrap_or(0);

    println!("{} -> {} over {} bytes", start, end, counter.len());
    println!("erases: {} total, {:.3} per increment, {}..={} per byte",
        mem.total_erases(), mem.total_erases() as f64 / increments.max(1) as f64, min, max);
    println!("writes: {} total", mem.total_writes());
    Ok(())
}

fn parse_u32(s: &str) -> Result<u32, std::num::ParseIntError> {
    match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn parse_u8(s: &str) -> Result<u8, std::num::ParseIntError> {
    match s.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

fn parse_hex(s: &str) -> anyhow::Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        bail!("odd number of hex digits in {:?}", s);
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).with_context(|| format!("bad hex {:?}", &s[i..i + 2])))
        .collect()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
