#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    if let Err(err) = native::run() {
        eprintln!("vrml_cli error: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use vrml_runtime::scene::Scene;
    use vrml_runtime::viewer::TraceViewer;

    const USAGE: &str = r"vrml_cli (vrml-runtime)

USAGE:
  vrml_cli <file.x3d> [options]

OPTIONS:
  --frames <n>       Number of update/render frames (default 1)
  --step <seconds>   Simulated time between frames (default 0.1)
  --start <seconds>  Time of the first frame; 0 or less uses the wall clock (default 0.001)
  -h, --help         Show this help
";

    struct Options {
        file: String,
        frames: usize,
        step: f64,
        start: f64,
    }

    fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
        let mut file = None;
        let mut frames = 1;
        let mut step = 0.1;
        let mut start = 0.001;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(None),
                "--frames" => frames = number(&arg, args.next())?,
                "--step" => step = number(&arg, args.next())?,
                "--start" => start = number(&arg, args.next())?,
                flag if flag.starts_with("--") => return Err(format!("unknown option {flag}")),
                _ if file.is_none() => file = Some(arg),
                _ => return Err(format!("unexpected argument {arg}")),
            }
        }

        match file {
            Some(file) => Ok(Some(Options {
                file,
                frames,
                step,
                start,
            })),
            None => Ok(None),
        }
    }

    fn number<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, String> {
        let value = value.ok_or_else(|| format!("{flag} needs a value"))?;
        value
            .parse()
            .map_err(|_| format!("{flag}: `{value}` is not a number"))
    }

    pub fn run() -> Result<(), String> {
        let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
            print!("{USAGE}");
            return Ok(());
        };

        let mut scene = Scene::default();
        scene
            .load_url_now(&[options.file.clone()])
            .map_err(|err| err.to_string())?;

        let mut viewer = TraceViewer::new();
        for frame in 0..options.frames {
            #[allow(clippy::cast_precision_loss)]
            let time = if options.start > 0.0 {
                options.start + options.step * frame as f64
            } else {
                0.0
            };
            let redraw = scene.update(time);
            scene.render(&mut viewer);

            println!("frame {frame} t={:.3} redraw={redraw}", scene.time());
            for call in viewer.take_calls() {
                println!("  {call:?}");
            }
            print_fields(&scene);
        }
        Ok(())
    }

    /// Exposed fields van elke node met een DEF-naam.
    fn print_fields(scene: &Scene) {
        for name in scene.scope().node_names() {
            let Some(id) = scene.find_node(&name) else {
                continue;
            };
            let Some(node_type) = scene.node_type(id) else {
                continue;
            };
            let exposed: Vec<String> = {
                let declarations = node_type.declarations();
                declarations
                    .fields()
                    .iter()
                    .filter(|field| declarations.has_exposed_field(&field.name).is_some())
                    .map(|field| field.name.clone())
                    .collect()
            };
            for field in exposed {
                if let Ok(value) = scene.get_field(id, &field) {
                    if !value.field_type().is_node() {
                        println!("  {name}.{field} = {value}");
                    }
                }
            }
        }
    }
}
