use clap::Parser;
use clap_num::maybe_hex;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use trapsim::cluster::Cluster;
use trapsim::config::{ClicConfig, HartConfig};
use trapsim::host::{Host, SimpleHost};
use trapsim::mode::PrivMode;
use trapsim::snapshot::{self, ClusterSnapshot};

/// Interactively drive the trap and interrupt core of a RISC-V hart
/// cluster: poke input nets, read and write the CLIC register pages,
/// step the delivery pipeline and inspect the trap CSRs.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Number of harts in the cluster
    #[arg(long, default_value_t = 1)]
    harts: u32,

    /// Model the cluster without a CLIC
    #[arg(long)]
    no_clic: bool,

    /// Number of CLIC interrupt inputs
    #[arg(long, default_value_t = 64)]
    interrupts: u32,

    /// Reset address (use 0x prefix for hexadecimal)
    #[arg(long, value_parser=maybe_hex::<u64>, default_value_t = 0)]
    reset_address: u64,

    /// Base address of the CLIC register pages (use 0x prefix for
    /// hexadecimal)
    #[arg(long, value_parser=maybe_hex::<u64>, default_value_t = 0x0200_0000)]
    clic_base: u64,
}

fn parse_number(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

fn print_hart(cluster: &Cluster, index: usize, host: &SimpleHost) {
    let hart = &cluster.harts[index];
    println!(
        "hart {}: mode={} debug={} halted={} pc=0x{:x}",
        hart.id,
        hart.mode.letter(),
        hart.debug_mode,
        hart.is_halted(),
        host.pc(),
    );
    println!(
        "  mstatus=0x{:x} mip=0x{:x} mie=0x{:x} mintstatus=0x{:x}",
        hart.csrs.mstatus.as_raw(),
        hart.mip(),
        hart.csrs.mie,
        hart.csrs.mintstatus.as_raw(),
    );
    for mode in [PrivMode::Machine, PrivMode::Supervisor, PrivMode::User] {
        println!(
            "  {}cause=0x{:x} {}epc=0x{:x} {}tval=0x{:x}",
            mode.letter(),
            hart.csrs.xcause(mode).as_raw(),
            mode.letter(),
            hart.csrs.xepc(mode),
            mode.letter(),
            hart.csrs.xtval(mode),
        );
    }
    match hart.pending_interrupt() {
        Some(selection) => println!(
            "  pending: id={} target={} level={} clic={}",
            selection.id,
            selection.target.letter(),
            selection.level,
            selection.is_clic,
        ),
        None => println!("  pending: none"),
    }
}

fn print_help() {
    println!(
        "commands:\n\
         \x20 step                  run one fetch-boundary check at pc\n\
         \x20 hart <n>              switch the active hart\n\
         \x20 sig <name> <0|1>      drive an input net (reset, nmi,\n\
         \x20                       haltreq, resethaltreq, deferint,\n\
         \x20                       scvalid)\n\
         \x20 int <id> <0|1>        drive an interrupt input net\n\
         \x20 read <offset>         read a CLIC byte\n\
         \x20 write <offset> <val>  write a CLIC byte\n\
         \x20 pc <addr>             set the program counter\n\
         \x20 wfi | ecall | ebreak  execute the named operation\n\
         \x20 mret | sret | uret | dret\n\
         \x20 retire                report one retired instruction\n\
         \x20 state                 print the active hart\n\
         \x20 traps                 list the trap catalogue\n\
         \x20 save | restore        snapshot the volatile state\n\
         \x20 quit"
    );
}

fn main() {
    let args = Args::parse();

    let mut config = HartConfig {
        reset_address: args.reset_address,
        ..HartConfig::default()
    };
    config.clic = if args.no_clic {
        None
    } else {
        Some(ClicConfig {
            num_interrupt: args.interrupts,
            mclicbase: args.clic_base,
            ..ClicConfig::default()
        })
    };

    let mut cluster = match Cluster::new(config, args.harts) {
        Ok(cluster) => cluster,
        Err(error) => {
            println!("Bad configuration: {error}");
            return;
        }
    };
    let mut host = SimpleHost::new();
    cluster.attach(&mut host);
    host.set_pc(args.reset_address);

    let mut active = 0usize;
    let mut saved: Option<ClusterSnapshot> = None;

    println!(
        "trapsim shell: {} hart(s), CLIC {}. Type help for commands.",
        args.harts,
        if args.no_clic { "absent" } else { "present" },
    );

    let mut editor = DefaultEditor::new().expect("terminal should open");
    loop {
        let line = match editor.readline("trapsim> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                break
            }
            Err(error) => {
                println!("Read error: {error}");
                break;
            }
        };
        let _ = editor.add_history_entry(line.as_str());
        let words: Vec<&str> = line.split_whitespace().collect();

        match words.as_slice() {
            [] => {}
            ["help"] => print_help(),
            ["quit"] | ["exit"] => break,
            ["state"] => print_hart(&cluster, active, &host),
            ["hart", index] => match parse_number(index) {
                Some(index) if (index as usize) < cluster.harts.len() => {
                    active = index as usize;
                }
                _ => println!("No such hart"),
            },
            ["step"] => {
                let pc = host.pc();
                let hart = &mut cluster.harts[active];
                if hart.fetch(&mut host, pc, 4) {
                    hart.retire(&mut host);
                    println!("fetch at 0x{pc:x} proceeds");
                } else {
                    println!(
                        "redirected: pc=0x{:x} last trap {:?}",
                        host.pc(),
                        hart.last_trap(),
                    );
                }
            }
            ["sig", name, value] => {
                let Some(value) = parse_number(value) else {
                    println!("Bad value");
                    continue;
                };
                let level = value != 0;
                let hart = &mut cluster.harts[active];
                match *name {
                    "reset" => hart.signal_reset(&mut host, level),
                    "nmi" => hart.signal_nmi(&mut host, level),
                    "haltreq" => hart.signal_haltreq(&mut host, level),
                    "resethaltreq" => hart.signal_resethaltreq(level),
                    "deferint" => hart.signal_deferint(&mut host, level),
                    "scvalid" => hart.signal_sc_valid(level),
                    _ => println!("Unknown net {name}"),
                }
            }
            ["int", id, value] => {
                match (parse_number(id), parse_number(value)) {
                    (Some(id), Some(value)) => {
                        cluster.harts[active].signal_interrupt(
                            &mut host,
                            id as u32,
                            value != 0,
                        );
                    }
                    _ => println!("Bad arguments"),
                }
            }
            ["read", offset] => match parse_number(offset) {
                Some(offset) => {
                    println!("0x{:02x}", cluster.clic_read(offset))
                }
                None => println!("Bad offset"),
            },
            ["write", offset, value] => {
                match (parse_number(offset), parse_number(value)) {
                    (Some(offset), Some(value)) => cluster.clic_write(
                        &mut host,
                        offset,
                        value as u8,
                    ),
                    _ => println!("Bad arguments"),
                }
            }
            ["pc", addr] => match parse_number(addr) {
                Some(addr) => host.set_pc(addr),
                None => println!("Bad address"),
            },
            ["wfi"] => cluster.harts[active].wfi(&mut host),
            ["ecall"] => cluster.harts[active].environment_call(&mut host),
            ["ebreak"] => cluster.harts[active].ebreak(&mut host),
            ["mret"] => cluster.harts[active].mret(&mut host),
            ["sret"] => cluster.harts[active].sret(&mut host),
            ["uret"] => cluster.harts[active].uret(&mut host),
            ["dret"] => cluster.harts[active].dret(&mut host, 0x7b200073),
            ["retire"] => cluster.harts[active].retire(&mut host),
            ["traps"] => {
                for descriptor in cluster.harts[active].trap_descriptors() {
                    println!(
                        "  {:2} {} {}",
                        descriptor.code,
                        if descriptor.interrupt { "int" } else { "exc" },
                        descriptor.name,
                    );
                }
            }
            ["save"] => {
                saved = Some(snapshot::save(&cluster));
                println!("saved");
            }
            ["restore"] => match &saved {
                Some(snapshot) => {
                    match snapshot::restore(&mut cluster, &mut host, snapshot)
                    {
                        Ok(()) => println!("restored"),
                        Err(error) => println!("Restore failed: {error}"),
                    }
                }
                None => println!("Nothing saved"),
            },
            _ => println!("Unknown command (try help)"),
        }
    }
}
