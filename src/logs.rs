//! Diagnostics dump: module log files, then the systemd journal.

use crate::runner;
use crate::ui;
use anyhow::Result;
use stackgraph::Module;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use walkdir::WalkDir;

/// Print every module's logs and, if `journal`, the systemd journal
pub fn collect(modules: &[Rc<Module>], journal: bool) -> Result<()> {
    {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        write_module_logs(&mut out, modules)?;
        out.flush()?;
    }

    if journal {
        ui::banner("Collecting journal logs");
        match runner::run_streaming("journalctl", &["-o", "short-precise", "--no-pager"]) {
            Ok(status) if !status.success() => log::warn!("journalctl exited with {status}"),
            Ok(_) => {}
            Err(e) => log::warn!("Could not read the journal: {e:#}"),
        }
        ui::banner("Collected journal logs");
    }
    Ok(())
}

/// Write the log files of each module between START/END banners
///
/// Modules without logs are skipped; missing paths are ignored.
pub fn write_module_logs<W: Write>(out: &mut W, modules: &[Rc<Module>]) -> io::Result<()> {
    for module in modules.iter().filter(|m| !m.logs().is_empty()) {
        write_logs(out, module.name(), module.logs())?;
    }
    Ok(())
}

fn write_logs<W: Write>(out: &mut W, name: &str, paths: &[PathBuf]) -> io::Result<()> {
    let title = format!("Collecting logs for {name}");
    write_banner(out, &format!("START {title}"))?;
    for path in paths {
        write_path(out, path)?;
    }
    write_banner(out, &format!("END {title}"))
}

fn write_banner<W: Write>(out: &mut W, msg: &str) -> io::Result<()> {
    for line in ui::banner_lines(msg) {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

fn write_path<W: Write>(out: &mut W, path: &Path) -> io::Result<()> {
    if !path.exists() {
        log::debug!("No logs at {}", path.display());
        return Ok(());
    }
    if !path.is_dir() {
        return write_file(out, path);
    }
    let files = WalkDir::new(path)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file());
    for entry in files {
        write_file(out, entry.path())?;
    }
    Ok(())
}

fn write_file<W: Write>(out: &mut W, path: &Path) -> io::Result<()> {
    match fs::read(path) {
        Ok(bytes) => out.write_all(String::from_utf8_lossy(&bytes).as_bytes()),
        Err(e) => {
            log::warn!("Could not read {}: {}", path.display(), e);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackgraph::{Collection, ModuleDescriptor, ModuleSpec, Registry};

    fn load(name: &str, factory: fn() -> ModuleSpec) -> Rc<Module> {
        Registry::new().load(
            &Collection::new("stack"),
            &ModuleDescriptor::new(name, format!("{name}.rs"), factory),
        )
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut out = Vec::new();
        f(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_module_without_logs_is_skipped() {
        let modules = [load("utils", ModuleSpec::new)];
        assert!(render(|out| write_module_logs(out, &modules)).is_empty());
    }

    #[test]
    fn test_missing_paths_only_print_banners() {
        let modules = [load("glance", || {
            ModuleSpec::new().logs(&["/nonexistent/regress-stack/glance/"])
        })];
        let text = render(|out| write_module_logs(out, &modules));
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[1].contains(" START Collecting logs for stack.glance "));
        assert!(lines[4].contains(" END Collecting logs for stack.glance "));
    }

    #[test]
    fn test_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let single = dir.path().join("single.log");
        fs::write(&single, "single line\n").unwrap();
        let logs = dir.path().join("service");
        fs::create_dir_all(logs.join("nested")).unwrap();
        fs::write(logs.join("b.log"), "second\n").unwrap();
        fs::write(logs.join("a.log"), "first\n").unwrap();
        fs::write(logs.join("nested").join("c.log"), [0xff, b'\n']).unwrap();

        let text = render(|out| write_logs(out, "svc", &[single, logs]));
        let body: Vec<_> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(body, ["single line", "first", "second", "\u{fffd}"]);
    }
}
