use std::env;
use std::process::ExitCode;

use ink_epub::{Epub, EpubError};

#[derive(Clone, Debug)]
enum Json {
    Null,
    Num(usize),
    Str(String),
    Arr(Vec<Json>),
    Obj(Vec<(String, Json)>),
}

impl Json {
    fn render(&self, pretty: bool) -> String {
        let mut out = String::new();
        self.write_into(&mut out, pretty, 0);
        out
    }

    fn write_into(&self, out: &mut String, pretty: bool, depth: usize) {
        match self {
            Json::Null => out.push_str("null"),
            Json::Num(v) => out.push_str(&v.to_string()),
            Json::Str(v) => write_json_string(out, v),
            Json::Arr(items) => {
                out.push('[');
                if !items.is_empty() && pretty {
                    out.push('\n');
                }
                for (idx, item) in items.iter().enumerate() {
                    if pretty {
                        write_indent(out, depth + 1);
                    }
                    item.write_into(out, pretty, depth + 1);
                    if idx + 1 != items.len() {
                        out.push(',');
                    }
                    if pretty {
                        out.push('\n');
                    }
                }
                if !items.is_empty() && pretty {
                    write_indent(out, depth);
                }
                out.push(']');
            }
            Json::Obj(fields) => {
                out.push('{');
                if !fields.is_empty() && pretty {
                    out.push('\n');
                }
                for (idx, (key, value)) in fields.iter().enumerate() {
                    if pretty {
                        write_indent(out, depth + 1);
                    }
                    write_json_string(out, key);
                    out.push(':');
                    if pretty {
                        out.push(' ');
                    }
                    value.write_into(out, pretty, depth + 1);
                    if idx + 1 != fields.len() {
                        out.push(',');
                    }
                    if pretty {
                        out.push('\n');
                    }
                }
                if !fields.is_empty() && pretty {
                    write_indent(out, depth);
                }
                out.push('}');
            }
        }
    }
}

fn write_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn write_json_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c <= '\u{1f}' => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn main() -> ExitCode {
    match run(env::args().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("error: {}", msg);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Vec<String>) -> Result<(), String> {
    let mut rest = args.into_iter().skip(1).collect::<Vec<_>>();
    let pretty = pop_flag(&mut rest, "--pretty");

    if rest.is_empty() || rest[0] == "--help" || rest[0] == "-h" {
        print_help();
        return Ok(());
    }

    let cmd = rest.remove(0);
    match cmd.as_str() {
        "info" => {
            let path = first_arg(&rest, "info requires <epub_path>")?;
            let book = load_book(&path)?;
            let output = Json::Obj(vec![
                ("epub".to_string(), Json::Str(path)),
                ("title".to_string(), Json::Str(book.title().to_string())),
                (
                    "cover_href".to_string(),
                    if book.cover_href().is_empty() {
                        Json::Null
                    } else {
                        Json::Str(book.cover_href().to_string())
                    },
                ),
                ("spine_count".to_string(), Json::Num(book.spine_count())),
                ("toc_count".to_string(), Json::Num(book.toc_count())),
                ("book_size".to_string(), Json::Num(book.book_size() as usize)),
            ]);
            println!("{}", output.render(pretty));
        }
        "spine" => {
            let path = first_arg(&rest, "spine requires <epub_path>")?;
            let book = load_book(&path)?;
            let sizes = book.cumulative_sizes();
            let items = (0..book.spine_count())
                .map(|index| {
                    Json::Obj(vec![
                        ("index".to_string(), Json::Num(index)),
                        (
                            "href".to_string(),
                            Json::Str(book.spine_href(index).to_string()),
                        ),
                        (
                            "cumulative_size".to_string(),
                            Json::Num(sizes[index] as usize),
                        ),
                    ])
                })
                .collect::<Vec<_>>();
            let output = Json::Obj(vec![
                ("epub".to_string(), Json::Str(path)),
                ("count".to_string(), Json::Num(items.len())),
                ("spine".to_string(), Json::Arr(items)),
            ]);
            println!("{}", output.render(pretty));
        }
        "toc" => {
            let path = first_arg(&rest, "toc requires <epub_path>")?;
            let book = load_book(&path)?;
            let entries = (0..book.toc_count())
                .filter_map(|index| {
                    book.toc_entry(index).map(|entry| {
                        Json::Obj(vec![
                            ("index".to_string(), Json::Num(index)),
                            ("label".to_string(), Json::Str(entry.label.clone())),
                            ("href".to_string(), Json::Str(entry.href.clone())),
                            (
                                "spine_index".to_string(),
                                Json::Num(book.spine_index_for_toc_index(index)),
                            ),
                        ])
                    })
                })
                .collect::<Vec<_>>();
            let output = Json::Obj(vec![
                ("epub".to_string(), Json::Str(path)),
                ("count".to_string(), Json::Num(entries.len())),
                ("toc".to_string(), Json::Arr(entries)),
            ]);
            println!("{}", output.render(pretty));
        }
        "progress" => {
            let args = rest;
            let path = first_arg(&args, "progress requires <epub_path>")?;
            let (index, fraction) = parse_progress_args(&args)?;
            let book = load_book(&path)?;
            let percent = book.progress_percent(index, fraction).map_err(display_err)?;
            let output = Json::Obj(vec![
                ("epub".to_string(), Json::Str(path)),
                ("spine_index".to_string(), Json::Num(index)),
                ("percent".to_string(), Json::Num(percent as usize)),
            ]);
            println!("{}", output.render(pretty));
        }
        _ => {
            return Err(format!(
                "unknown command '{}'; run `ink-epub --help` for usage",
                cmd
            ));
        }
    }

    Ok(())
}

fn parse_progress_args(args: &[String]) -> Result<(usize, f32), String> {
    let mut index = None;
    let mut fraction = 0.0f32;
    let mut i = 1usize;
    while i < args.len() {
        match args[i].as_str() {
            "--index" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| "--index requires a value".to_string())?;
                index = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| format!("invalid --index value '{}'", value))?,
                );
                i += 2;
            }
            "--fraction" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| "--fraction requires a value".to_string())?;
                fraction = value
                    .parse::<f32>()
                    .map_err(|_| format!("invalid --fraction value '{}'", value))?;
                i += 2;
            }
            _ => i += 1,
        }
    }

    let index = index.ok_or_else(|| "progress requires --index <n>".to_string())?;
    Ok((index, fraction))
}

fn load_book(path: &str) -> Result<Epub, String> {
    let mut book = Epub::new(path, env::temp_dir().join("ink-epub"));
    book.load().map_err(display_err)?;
    Ok(book)
}

fn first_arg(args: &[String], msg: &str) -> Result<String, String> {
    args.first().cloned().ok_or_else(|| msg.to_string())
}

fn pop_flag(args: &mut Vec<String>, flag: &str) -> bool {
    if let Some(pos) = args.iter().position(|a| a == flag) {
        args.remove(pos);
        true
    } else {
        false
    }
}

fn display_err(err: EpubError) -> String {
    err.to_string()
}

fn print_help() {
    let help = r#"ink-epub - inspect EPUB book structure

USAGE:
  ink-epub [--pretty] <command> [args...]

COMMANDS:
  info <epub_path>
  spine <epub_path>
  toc <epub_path>
  progress <epub_path> --index <n> [--fraction <0.0..1.0>]

NOTES:
  - Output is JSON by default.
  - `spine` sizes are cumulative uncompressed byte counts.
  - `progress` reports whole-book percent for a position within a chapter.
"#;
    println!("{}", help);
}
