//! Man page generator for cfprog
//!
//! Writes `cfprog.1` plus one `cfprog-<command>.1` page per subcommand.
//!
//! Usage: cargo run --bin gen-manpage -- [output-dir]

use clap::CommandFactory;
use std::fs;
use std::path::{Path, PathBuf};

#[path = "../cli.rs"]
mod cli;

fn render(man: clap_mangen::Man, path: &Path) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;
    fs::write(path, buffer)?;
    println!("Generated {}", path.display());
    Ok(())
}

/// One page per subcommand, named `cfprog-<command>`
fn subcommand_pages(cmd: &clap::Command) -> Vec<(String, clap_mangen::Man)> {
    cmd.get_subcommands()
        .map(|sub| {
            let name = format!("cfprog-{}", sub.get_name());
            let page = clap_mangen::Man::new(sub.clone()).title(name.as_str());
            (name, page)
        })
        .collect()
}

fn main() -> std::io::Result<()> {
    let output_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("man"));
    fs::create_dir_all(&output_dir)?;

    let cmd = cli::Cli::command();
    for (name, page) in subcommand_pages(&cmd) {
        render(page, &output_dir.join(format!("{}.1", name)))?;
    }
    render(clap_mangen::Man::new(cmd), &output_dir.join("cfprog.1"))?;

    println!("\nTo view: man -l {}", output_dir.join("cfprog.1").display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subcommand_pages_are_titled() {
        let cmd = cli::Cli::command();
        let pages = subcommand_pages(&cmd);
        assert_eq!(pages.len(), cmd.get_subcommands().count());

        let (name, page) = pages
            .into_iter()
            .find(|(name, _)| name == "cfprog-read")
            .unwrap();
        let mut buffer = Vec::new();
        page.render(&mut buffer).unwrap();
        // roff escapes hyphens
        let text = String::from_utf8(buffer).unwrap().replace("\\-", "-");
        assert!(text.contains(&name));
    }
}
