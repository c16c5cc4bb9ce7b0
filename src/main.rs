use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::{debug, LevelFilter};
use simple_logger::SimpleLogger;

use signimage::signtool::DEFAULT_SIGNTOOL;
use signimage::*;

/// Sign a bootloader image with signtool and append the SCRTU and DDR
/// firmware behind the signed header.
#[derive(Parser, Debug)]
#[command(
    name = "signimage",
    version,
    about = "Sign bootloader images and append SCRTU/DDR firmware"
)]
struct Cli {
    /// [BLp|BLe|BLx|BLw] Image format
    #[arg(short = 't', long = "type")]
    image_type: Option<String>,

    /// Input file
    #[arg(short = 'i', long = "infile")]
    infile: Option<PathBuf>,

    /// Private key (DER)
    #[arg(short = 'p', long = "prikey")]
    prikey: Option<PathBuf>,

    /// Wrap key for BLw
    #[arg(short = 'w', long = "wrapkey")]
    wrapkey: Option<PathBuf>,

    /// Certificate
    #[arg(short = 'c', long = "cert")]
    cert: Option<PathBuf>,

    /// SCRTU firmware file
    #[arg(long = "scrtu_fw")]
    scrtu_fw: Option<PathBuf>,

    /// DDR firmware file
    #[arg(long = "ddr_fw")]
    ddr_fw: Option<PathBuf>,

    /// SPI attribute, hex format: 0x12341234
    #[arg(long = "attr_spi")]
    attr_spi: Option<String>,

    /// SPI BL33 address, hex format: 0x12341234
    #[arg(long = "spi_bl33_addr")]
    spi_bl33_addr: Option<String>,

    /// SPI BL33 size, hex format: 0x12341234
    #[arg(long = "spi_bl33_size")]
    spi_bl33_size: Option<String>,

    /// Signing tool to run
    #[arg(long = "signtool", env = "SIGNTOOL", default_value = DEFAULT_SIGNTOOL)]
    signtool: PathBuf,

    /// Directory for header_only.bin, _final_<infile> and signed_<infile>
    #[arg(short = 'o', long = "outdir", default_value = ".")]
    outdir: PathBuf,

    /// Stop when signtool exits with an error
    #[arg(long = "strict")]
    strict: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::Warn,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };
    if let Err(e) = SimpleLogger::new().with_level(level).env().init() {
        eprintln!("signimage: cannot initialise logging: {e}");
    }
}

fn show_valid() {
    eprintln!("\nSupported image types:");
    for &(t, _, _) in ImageType::table() {
        if t.is_supported() {
            eprintln!("\t{:<5}  {}", t.short_name(), t.long_name());
        }
    }
    eprintln!();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    debug!("args: {cli:?}");

    let image_type = match cli.image_type.as_deref().map(|s| (s, ImageType::from_name(s))) {
        Some((_, Some(t))) if t.is_supported() => t,
        Some((name, _)) => {
            show_valid();
            eprintln!("signimage: not support image type '{name}'");
            process::exit(1);
        }
        None => {
            show_valid();
            eprintln!("signimage: missing image type (-t)");
            process::exit(1);
        }
    };

    // -i and -p only matter once the type is known to be signable
    let (infile, prikey) = match (cli.infile, cli.prikey) {
        (Some(i), Some(p)) => (i, p),
        (None, _) => fail(SignImageError::MissingArgument("input file (-i)")),
        (_, None) => fail(SignImageError::MissingArgument("private key (-p)")),
    };

    let params = SignParams {
        image_type,
        infile,
        prikey,
        wrapkey: cli.wrapkey,
        cert: cli.cert,
        scrtu_fw: cli.scrtu_fw,
        ddr_fw: cli.ddr_fw,
        attrs: AttrParams {
            spi: cli.attr_spi,
            spi_bl33_addr: cli.spi_bl33_addr,
            spi_bl33_size: cli.spi_bl33_size,
        },
        outdir: cli.outdir,
        strict: cli.strict,
    };

    let tool = ExternalSignTool::new(cli.signtool);
    match sign_image_with(&params, &tool) {
        Ok(signed) => {
            if !cli.quiet {
                eprintln!("Signed image '{}' created.", signed.signed.display());
            }
        }
        Err(e) => fail(e),
    }
}

fn fail(e: SignImageError) -> ! {
    eprintln!("signimage: {e}");
    process::exit(1);
}
