use as1600::diag::{Console, Diagnostics};
use as1600::image::RomImage;
use as1600::output::{output_names, outphase, summary, symbol_file, symbol_listing};
use as1600::session::Session;
use as1600::source::FileSource;
use as1600::{Error, Result};
use color_print::cprintln;
use std::path::{Path, PathBuf};

const HELP_TEMPLATE: &str = "\
{before-help}{bin} {version}
  {author}
  {about}

{usage-heading}
{tab}{usage}

{all-args}{after-help}";

#[derive(Debug, clap::Parser)]
#[clap(author, version, about, help_template = HELP_TEMPLATE)]
struct Args {
    /// Source file
    input: String,

    /// Output file (.bin, a .cfg is written next to it)
    #[clap(short, long)]
    out_file: Option<PathBuf>,

    /// Listing file
    #[clap(short, long)]
    list_file: Option<PathBuf>,

    /// Symbol table file
    #[clap(short, long)]
    sym_file: Option<PathBuf>,

    /// Include search path, may be repeated
    #[clap(short, long)]
    include: Vec<PathBuf>,

    /// Print the memory map
    #[clap(short = 'm', long)]
    show_map: bool,

    /// Treat ROM overwrites as errors from the start
    #[clap(short, long)]
    err_if_overwritten: bool,
}

fn main() {
    use clap::Parser;

    let args: Args = Args::parse();
    println!("as1600 CP-1600 Assembler");

    match run(&args) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            cprintln!("<r,s>Fatal error</> - {}", e);
            std::process::exit(2);
        }
    }
}

fn write(path: &Path, data: &[u8]) -> Result<()> {
    use std::io::Write;

    let name = path.display().to_string();
    let mut file = std::fs::File::create(path).map_err(|e| Error::FileCreate(name.clone(), e))?;
    file.write_all(data).map_err(|e| Error::FileWrite(name, e))
}

fn run(args: &Args) -> Result<i32> {
    let out = args
        .out_file
        .clone()
        .unwrap_or_else(|| Path::new(&args.input).with_extension("bin"));
    let (bin_path, cfg_path) = output_names(&out)?;
    let mut diag = Console::new();

    println!("1. Pass 1: parse and collect symbols");
    println!("  < {}", &args.input);
    let source = FileSource::open(&args.input)?;
    let mut session = Session::new(Box::new(source), args.include.clone(), &mut diag)?;
    session.pass1()?;
    let (mut syms, mut records) = session.finish();
    syms.build_index();
    let pass1_errors = diag.errors();

    let mut listing = args.list_file.as_ref().map(|_| symbol_listing(&syms));
    if let Some(path) = &args.sym_file {
        println!("  > {}", path.display());
        write(path, symbol_file(&syms).as_bytes())?;
    }

    println!("2. Pass 2: evaluate and generate output");
    let mut image = RomImage::new();
    if args.err_if_overwritten {
        image.set_overwrite(Some(true), None);
    }
    outphase(&mut records, &syms, &mut image, &mut diag, listing.as_mut());

    let totals = summary(diag.errors(), diag.warnings());
    print!("{}", totals);
    if let (Some(path), Some(listing)) = (&args.list_file, listing.as_mut()) {
        listing.push_str(&totals);
        println!("  > {}", path.display());
        write(path, listing.as_bytes())?;
    }

    if args.show_map {
        print!("{}", image.memory_map());
    }

    if pass1_errors > 0 || diag.errors() > 0 {
        for path in [&bin_path, &cfg_path] {
            let _ = std::fs::remove_file(path);
        }
        return Ok(2);
    }

    let (bin, cfg) = image.bincfg();
    println!("  > {}", bin_path.display());
    write(&bin_path, &bin)?;
    println!("  > {}", cfg_path.display());
    write(&cfg_path, cfg.as_bytes())?;
    Ok(0)
}
