//! 反爬挑战页回退：外部无头浏览器进程渲染页面。
//!
//! 核心流程只依赖 `PageRenderer`，未启用时使用 `DisabledRenderer`。

use std::process::{Command, Stdio};

use tracing::{debug, info};

use super::network::FetchError;

pub trait PageRenderer: Send + Sync {
    fn render(&self, url: &str) -> Result<String, FetchError>;
}

/// 未允许回退：直接报告被挑战页拦截。
pub struct DisabledRenderer;

impl PageRenderer for DisabledRenderer {
    fn render(&self, url: &str) -> Result<String, FetchError> {
        Err(FetchError::ChallengeBlocked(url.to_string()))
    }
}

/// 以 `<program> <args...> <url>` 形式调用外部抓取脚本，stdout 即渲染后的 HTML。
#[derive(Debug, Clone)]
pub struct HeadlessCommand {
    program: String,
    args: Vec<String>,
}

impl HeadlessCommand {
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl PageRenderer for HeadlessCommand {
    fn render(&self, url: &str) -> Result<String, FetchError> {
        info!(target: "network", "检测到挑战页，调用无头浏览器: {}", url);
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| FetchError::Render(format!("spawn {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FetchError::Render(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let html = String::from_utf8_lossy(&output.stdout).into_owned();
        if html.trim().is_empty() {
            return Err(FetchError::Render("empty output".to_string()));
        }
        debug!(target: "network", bytes = html.len(), "无头浏览器返回页面");
        Ok(html)
    }
}

pub fn renderer_for(enabled: bool, command: &[String]) -> Box<dyn PageRenderer> {
    match (enabled, HeadlessCommand::new(command)) {
        (true, Some(cmd)) => Box::new(cmd),
        _ => Box::new(DisabledRenderer),
    }
}
