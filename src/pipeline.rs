use crate::io_adapters::{self, Console, Input, Output};
use crate::parser::ParsedCommand;
use os_pipe::{PipeReader, PipeWriter};
use std::io;

/// Concrete streams of one stage.
pub(crate) struct Streams {
    pub input: Input,
    pub output: Output,
}

pub(crate) struct Stage {
    pub index: usize,
    pub command: ParsedCommand,
    /// Resolution failures (e.g. a missing redirect file) only affect this stage.
    pub streams: anyhow::Result<Streams>,
}

/// Parsed commands with their streams wired together.
pub(crate) struct Pipeline {
    pub stages: Vec<Stage>,
    /// One backgrounded stage backgrounds the whole chain.
    pub background: bool,
}

impl Pipeline {
    /// Allocates the pipes between adjacent stages and resolves every stage's
    /// streams. Pipe ends a stage does not use are closed right away.
    pub(crate) fn build(
        commands: Vec<ParsedCommand>,
        path: &str,
        console: &dyn Console,
    ) -> io::Result<Self> {
        let background = commands.iter().any(|c| c.background);
        let (mut readers, mut writers) = allocate_pipes(commands.len())?;

        let stages = commands
            .into_iter()
            .enumerate()
            .map(|(index, command)| {
                let upstream = index
                    .checked_sub(1)
                    .and_then(|prev| readers.get_mut(prev))
                    .and_then(Option::take);
                let downstream = writers.get_mut(index).and_then(Option::take);
                let streams = resolve(&command, path, console, upstream, downstream, background);
                if let Err(err) = &streams {
                    tracing::warn!(stage = index, command = %command.name, "{err:#}");
                }
                Stage {
                    index,
                    command,
                    streams,
                }
            })
            .collect();

        Ok(Self { stages, background })
    }

    pub(crate) fn len(&self) -> usize {
        self.stages.len()
    }
}

/// Pipe `i` connects stage `i` (writer) to stage `i + 1` (reader).
fn allocate_pipes(stages: usize) -> io::Result<(Vec<Option<PipeReader>>, Vec<Option<PipeWriter>>)> {
    let count = stages.saturating_sub(1);
    let mut readers = Vec::with_capacity(count);
    let mut writers = Vec::with_capacity(count);
    for _ in 0..count {
        let (reader, writer) = os_pipe::pipe()?;
        readers.push(Some(reader));
        writers.push(Some(writer));
    }
    Ok((readers, writers))
}

/// Picks each side of a stage: redirect file, else neighbouring pipe, else console.
fn resolve(
    command: &ParsedCommand,
    path: &str,
    console: &dyn Console,
    upstream: Option<PipeReader>,
    downstream: Option<PipeWriter>,
    background: bool,
) -> anyhow::Result<Streams> {
    let input = if command.input.is_empty() {
        match upstream {
            Some(reader) => Input::Pipe(reader),
            None => Input::Interactive(console.input()),
        }
    } else {
        drop(upstream);
        Input::File(io_adapters::open_input(path, &command.input)?)
    };

    let output = if command.output.is_empty() {
        match downstream {
            Some(writer) => Output::Pipe(writer),
            None => Output::Interactive(console.output()),
        }
    } else {
        drop(downstream);
        Output::File(io_adapters::open_output(path, &command.output)?)
    };

    Ok(Streams {
        input: io_adapters::insulate(input, background),
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_adapters::MemConsole;
    use std::io::{Read, Write};

    fn build(commands: Vec<ParsedCommand>, path: &str) -> Pipeline {
        Pipeline::build(commands, path, &MemConsole::default()).unwrap()
    }

    #[test]
    fn test_single_stage_uses_console_on_both_sides() {
        let pipeline = build(vec![ParsedCommand::new("pwd")], "/");
        assert!(!pipeline.background);
        let streams = pipeline.stages[0].streams.as_ref().unwrap();
        assert!(streams.input.is_interactive());
        assert!(streams.output.is_interactive());
    }

    #[test]
    fn test_middle_stages_are_wired_with_pipes() {
        let mut pipeline = build(
            vec![
                ParsedCommand::new("a"),
                ParsedCommand::new("b"),
                ParsedCommand::new("c"),
            ],
            "/",
        );
        assert_eq!(pipeline.len(), 3);

        let mut second = pipeline.stages.remove(1).streams.unwrap();
        let mut first = pipeline.stages.remove(0).streams.unwrap();
        assert!(first.input.is_interactive());
        assert!(matches!(first.output, Output::Pipe(_)));
        assert!(matches!(second.input, Input::Pipe(_)));
        assert!(matches!(second.output, Output::Pipe(_)));

        first.output.write_all(b"through the pipe").unwrap();
        drop(first);
        let mut received = String::new();
        second.input.read_to_string(&mut received).unwrap();
        assert_eq!(received, "through the pipe");
    }

    #[test]
    fn test_redirect_file_replaces_pipe_and_closes_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().into_owned();
        let mut pipeline = build(
            vec![
                ParsedCommand::new("a").output("out.txt"),
                ParsedCommand::new("b"),
            ],
            &path,
        );

        let mut second = pipeline.stages.remove(1).streams.unwrap();
        let first = pipeline.stages.remove(0).streams.unwrap();
        assert!(matches!(first.output, Output::File(_)));
        assert!(dir.path().join("out.txt").exists());

        // nobody holds the writer of the pipe, so the reader sees EOF at once
        let mut received = Vec::new();
        second.input.read_to_end(&mut received).unwrap();
        assert!(received.is_empty());
    }

    #[test]
    fn test_background_flag_spreads_and_insulates_first_stage() {
        let pipeline = build(
            vec![ParsedCommand::new("a"), ParsedCommand::new("b").background()],
            "/",
        );
        assert!(pipeline.background);
        let first = pipeline.stages[0].streams.as_ref().unwrap();
        assert!(matches!(first.input, Input::Exhausted));
    }

    #[test]
    fn test_missing_input_file_fails_only_that_stage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().into_owned();
        let pipeline = build(
            vec![
                ParsedCommand::new("a").input("missing.txt"),
                ParsedCommand::new("b"),
            ],
            &path,
        );

        assert!(pipeline.stages[0].streams.is_err());
        assert!(pipeline.stages[1].streams.is_ok());
    }
}
