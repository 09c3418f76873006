//! tundump - print packets received on a TUN/TAP interface.

use clap::{Parser, ValueEnum};
use tunlink::{Mode, Packet, TunTap};

#[derive(Parser)]
#[command(
    name = "tundump",
    version,
    about = "Print packets received on a TUN/TAP interface"
)]
struct Cli {
    /// Device kind.
    #[arg(value_enum)]
    kind: Kind,

    /// Device name; may contain a %d placeholder (e.g. "tun%d").
    name: String,

    /// Use the blocking API instead of the channel-based one.
    #[arg(long)]
    blocking: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Tun,
    Tap,
}

impl From<Kind> for Mode {
    fn from(kind: Kind) -> Mode {
        match kind {
            Kind::Tun => Mode::Tun,
            Kind::Tap => Mode::Tap,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = if cli.blocking {
        run_blocking(&cli)
    } else {
        tokio::runtime::Runtime::new()?.block_on(run_channels(&cli))
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn run_blocking(cli: &Cli) -> anyhow::Result<()> {
    let mut dev = TunTap::open(&cli.name, cli.kind.into())?;
    println!("Listening on {}", dev.name());

    loop {
        match dev.read_packet() {
            Ok(packet) => print_packet(&packet),
            // A runt frame leaves the device usable; keep reading.
            Err(e) => eprintln!("read error: {}", e),
        }
    }
}

async fn run_channels(cli: &Cli) -> anyhow::Result<()> {
    let mut dev = TunTap::builder()
        .name(cli.name.as_str())
        .mode(cli.kind.into())
        .create_async()
        .await?;
    println!("Listening on {}", dev.name());

    while let Some(packet) = dev.recv().await {
        print_packet(&packet);
    }

    dev.close().await?;
    Ok(())
}

fn print_packet(packet: &Packet) {
    // "!" marks packets the kernel clipped to fit the read buffer.
    let marker = if packet.truncated { '!' } else { ' ' };
    print!("{}{:04x} ", marker, packet.protocol);
    for byte in &packet.payload {
        print!("{:02x}", byte);
    }
    println!();
}
