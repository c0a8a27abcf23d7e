use crate::aggregate::CommandGroup;
use crate::collectors::cpu::CpuRateSnapshot;
use std::io::{self, Write};

pub trait Renderer: Send {
    fn render(&mut self, cpu: Option<&CpuRateSnapshot>, ranked: &[CommandGroup])
        -> io::Result<()>;
}

/// Plain line-per-command output, one block per tick.
pub struct TextRenderer<W> {
    out: W,
    show_cpu: bool,
}

impl TextRenderer<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TextRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            show_cpu: false,
        }
    }

    pub fn with_cpu_summary(mut self, on: bool) -> Self {
        self.show_cpu = on;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Renderer for TextRenderer<W> {
    fn render(
        &mut self,
        cpu: Option<&CpuRateSnapshot>,
        ranked: &[CommandGroup],
    ) -> io::Result<()> {
        if self.show_cpu {
            if let Some(c) = cpu {
                writeln!(
                    self.out,
                    "CPU: user {:.2}, system {:.2}, idle {:.2}, iowait {:.2}",
                    c.user, c.system, c.idle, c.iowait
                )?;
            }
        }
        for g in ranked {
            writeln!(
                self.out,
                "Command: {}, CPU: {:.2}, Memory: {:.2}",
                g.command, g.cpu_percent, g.memory_percent
            )?;
        }
        writeln!(self.out, "---")?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_ranked_block() {
        let mut r = TextRenderer::new(Vec::new()).with_cpu_summary(true);
        let cpu = CpuRateSnapshot {
            user: 30.0,
            idle: 70.0,
            ..Default::default()
        };
        r.render(
            Some(&cpu),
            &[CommandGroup {
                command: "postgres".into(),
                cpu_percent: 12.5,
                memory_percent: 4.0,
            }],
        )
        .unwrap();
        let text = String::from_utf8(r.into_inner()).unwrap();
        assert_eq!(
            text,
            "CPU: user 30.00, system 0.00, idle 70.00, iowait 0.00\n\
             Command: postgres, CPU: 12.50, Memory: 4.00\n---\n"
        );
    }
}
