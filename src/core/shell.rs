//! Purpose: Build remote shell command lines from structured words.
//! Exports: `ShellCommand`.
//! Role: The only place remote command strings are assembled; every word is quoted here.
//! Invariants: Caller-supplied text is always quoted; only globs and pipes stay unquoted.
//! Invariants: Glob patterns are `'static` so they cannot carry caller data.
use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Debug, Eq, PartialEq)]
enum Word {
    Quoted(String),
    Glob { dir: String, pattern: &'static str },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShellCommand {
    program: String,
    words: Vec<Word>,
    pipe: Option<Box<ShellCommand>>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            words: Vec::new(),
            pipe: None,
        }
    }

    pub fn arg(mut self, word: impl Into<String>) -> Self {
        self.words.push(Word::Quoted(word.into()));
        self
    }

    pub fn args<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.words
            .extend(words.into_iter().map(|word| Word::Quoted(word.into())));
        self
    }

    /// Append `<dir>/<pattern>` with the directory quoted and the pattern left for the shell.
    pub fn glob_in(mut self, dir: impl Into<String>, pattern: &'static str) -> Self {
        self.words.push(Word::Glob {
            dir: dir.into(),
            pattern,
        });
        self
    }

    /// Feed this command's stdout into `next`.
    pub fn pipe(mut self, next: ShellCommand) -> Self {
        match self.pipe {
            Some(ref mut tail) => {
                let current = std::mem::replace(tail.as_mut(), ShellCommand::new(""));
                **tail = current.pipe(next);
            }
            None => self.pipe = Some(Box::new(next)),
        }
        self
    }

    pub fn render(&self) -> Result<String, Error> {
        let mut parts = vec![quote(&self.program)?];
        for word in &self.words {
            match word {
                Word::Quoted(text) => parts.push(quote(text)?),
                Word::Glob { dir, pattern } => {
                    let trimmed = dir.trim_end_matches('/');
                    parts.push(format!("{}/{pattern}", quote(trimmed)?));
                }
            }
        }
        let mut line = parts.join(" ");
        if let Some(next) = &self.pipe {
            line.push_str(" | ");
            line.push_str(&next.render()?);
        }
        Ok(line)
    }
}

fn quote(word: &str) -> Result<String, Error> {
    shlex::try_quote(word)
        .map(|quoted| quoted.into_owned())
        .map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("cannot quote shell word {word:?}"))
                .with_source(err)
        })
}
