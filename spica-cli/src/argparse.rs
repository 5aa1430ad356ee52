use clap::{App, Arg, ArgMatches};

pub fn parse_args() -> ArgMatches<'static> {
    App::new("spica")
        .version("0.1.0")
        .about("Physically-based renderer")
        .arg(
            Arg::with_name("SCENE")
                .help(
                    "Scene to render: cornell, furnace, caustic, glassball, \
                     subsurface or plastic",
                )
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("integrator")
                .long("integrator")
                .short("i")
                .takes_value(true)
                .default_value("path")
                .help("path|volpath|bdpt|pssmlt|ppm|sppm|irrcache"),
        )
        .arg(
            Arg::with_name("samples")
                .long("samples")
                .short("s")
                .takes_value(true)
                .default_value("16")
                .help("Samples (or iterations/mutations) per pixel"),
        )
        .arg(
            Arg::with_name("threads")
                .long("threads")
                .short("t")
                .takes_value(true)
                .help("Worker threads; defaults to all cores"),
        )
        .arg(
            Arg::with_name("output")
                .long("output")
                .short("o")
                .takes_value(true)
                .default_value("image_%03d.png")
                .help("Output pattern; %03d expands to the checkpoint index"),
        )
        .arg(
            Arg::with_name("width")
                .long("width")
                .takes_value(true)
                .default_value("400"),
        )
        .arg(
            Arg::with_name("height")
                .long("height")
                .takes_value(true)
                .default_value("300"),
        )
        .arg(
            Arg::with_name("verbose")
                .long("verbose")
                .short("v")
                .help("Debug logging"),
        )
        .get_matches()
}
