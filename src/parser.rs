use crate::error::ShellError;
use crate::tokenizer::tokenize;

/// One argv tuple within a pipeline. The first element is the program,
/// looked up via the session's `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub argv: Vec<String>,
}

/// Where a pipeline's input comes from, beyond the session's own terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    None,
    /// `<N` — consume from the user pipe `N -> me`. Stores the zero-based user index.
    UserIn(u8),
}

/// The terminal wiring of a pipeline's final stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// No explicit disposition — stdout goes to the session's socket (or a
    /// latched numbered-pipe write end, resolved at dispatch time).
    Ordinary,
    /// `> path` — stdout truncates and writes to `path`.
    ToFile(String),
    /// `|N` — stdout is wired into the numbered-pipe slot `N` lines ahead.
    NumberedOut(u16),
    /// `!N` — like `NumberedOut`, but the last stage's stderr is duped too.
    NumberedOutErr(u16),
    /// `>N` — stdout is wired into the user pipe `me -> N`. Stores the
    /// zero-based user index.
    UserOut(u8),
}

/// A fully parsed command line: one or more piped stages plus source/disposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
    pub source: Source,
    pub disposition: Disposition,
}

/// Parse a non-empty, already-tokenized command line into a [`Pipeline`].
///
/// Scans tokens left to right per the grammar in spec §4.1/§6: `>` and
/// `|`/`!` with a glued integer terminate the pipeline; `>N`/`<N` with a
/// glued integer are positional modifiers that do not terminate the scan
/// (mirroring the reference implementation's `continue` vs `break` split);
/// `|` alone starts a new stage. Any other token is appended to the
/// current stage's argv.
pub fn parse(line: &str) -> Result<Pipeline, ShellError> {
    let tokens = tokenize(line);
    parse_tokens(&tokens)
}

fn parse_tokens(tokens: &[String]) -> Result<Pipeline, ShellError> {
    let mut stages = Vec::new();
    let mut current = Vec::new();
    let mut source = Source::None;
    let mut pending_user_out: Option<u8> = None;
    let mut terminal: Option<Disposition> = None;

    let mut i = 0;
    while i < tokens.len() {
        let tok = tokens[i].as_str();

        if tok == ">" {
            i += 1;
            let path = tokens
                .get(i)
                .ok_or_else(|| ShellError::Parse("expected filename after '>'".to_string()))?;
            terminal = Some(Disposition::ToFile(path.clone()));
            i += 1;
            break;
        } else if tok == "|" {
            stages.push(Stage {
                argv: std::mem::take(&mut current),
            });
            i += 1;
        } else if let Some(digits) = tok.strip_prefix('>') {
            let n = parse_user_index(digits)?;
            pending_user_out = Some(n);
            i += 1;
        } else if let Some(digits) = tok.strip_prefix('<') {
            let n = parse_user_index(digits)?;
            source = Source::UserIn(n);
            i += 1;
        } else if let Some(digits) = tok.strip_prefix('!') {
            let n = parse_offset(digits)?;
            terminal = Some(Disposition::NumberedOutErr(n));
            i += 1;
            break;
        } else if let Some(digits) = tok.strip_prefix('|') {
            let n = parse_offset(digits)?;
            terminal = Some(Disposition::NumberedOut(n));
            i += 1;
            break;
        } else {
            current.push(tok.to_string());
            i += 1;
        }
    }

    stages.push(Stage { argv: current });

    if stages.iter().any(|s| s.argv.is_empty()) {
        return Err(ShellError::Parse("empty command in pipeline".to_string()));
    }

    let disposition = terminal.unwrap_or_else(|| match pending_user_out {
        Some(j) => Disposition::UserOut(j),
        None => Disposition::Ordinary,
    });

    Ok(Pipeline {
        stages,
        source,
        disposition,
    })
}

/// Parse a 1-based user id suffix (`"2"` in `>2`/`<2`) into a zero-based index.
fn parse_user_index(digits: &str) -> Result<u8, ShellError> {
    let n: u32 = digits
        .parse()
        .map_err(|_| ShellError::Parse(format!("invalid user id '{digits}'")))?;
    if n < 1 || n > 30 {
        return Err(ShellError::Parse(format!("user id out of range: {n}")));
    }
    Ok((n - 1) as u8)
}

/// Parse a positive numbered-pipe offset (`"3"` in `|3`/`!3`).
fn parse_offset(digits: &str) -> Result<u16, ShellError> {
    let n: u32 = digits
        .parse()
        .map_err(|_| ShellError::Parse(format!("invalid numbered-pipe offset '{digits}'")))?;
    if n < 1 {
        return Err(ShellError::Parse(
            "numbered-pipe offset must be positive".to_string(),
        ));
    }
    Ok(n as u16)
}
