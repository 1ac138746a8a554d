use std::env;
use std::io::{self, ErrorKind, Write};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use log::{debug, warn};

/// 出力をページャーに渡して表示する。
///
/// ページャーを起動できない場合や`use_pager`が`false`の場合は標準出力にそのまま書き出す。
pub fn show(content: &[u8], use_pager: bool) -> Result<()> {
    if use_pager {
        let (program, args) = pager_command(env::var("PAGER").ok());
        debug!("Starting pager: {} {:?}", program, args);

        match Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .spawn()
        {
            Ok(mut child) => {
                if let Some(mut stdin) = child.stdin.take() {
                    // 途中でページャーを閉じた場合は残りを捨てる
                    match stdin.write_all(content) {
                        Err(err) if err.kind() != ErrorKind::BrokenPipe => {
                            return Err(err).context("Failed to write to pager");
                        }
                        _ => {}
                    }
                }
                child.wait().context("Failed to wait for pager")?;
                return Ok(());
            }
            Err(err) => warn!("Failed to start pager {}: {}", program, err),
        }
    }

    let mut stdout = io::stdout().lock();
    stdout.write_all(content).context("Failed to write output")?;
    stdout.flush().context("Failed to flush output")?;

    Ok(())
}

/// `$PAGER`からコマンドと引数を決める。未設定なら`less -R`を使う。
fn pager_command(pager: Option<String>) -> (String, Vec<String>) {
    let mut words = pager
        .as_deref()
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string);

    match words.next() {
        Some(program) => (program, words.collect()),
        None => ("less".to_string(), vec!["-R".to_string()]),
    }
}
