use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::rc::Rc;

use regex::Regex;

use crate::frontend::frontend::InstrSource;
use crate::instructions::instructions::TraceInstr;

/// A fully parsed instruction trace.
pub struct Program {
    pub code: Vec<TraceInstr>,
}

/// Pull adapter the frontend consumes; yields the program's records in
/// order and reports end-of-trace once they run out.
pub struct ProgramSource {
    program: Rc<Program>,
    pos: usize,
}

impl ProgramSource {
    pub fn new(program: &Rc<Program>) -> ProgramSource {
        ProgramSource {
            program: Rc::clone(program),
            pos: 0,
        }
    }
}

impl InstrSource for ProgramSource {
    fn read_instruction(&mut self, out: &mut TraceInstr) -> bool {
        match self.program.code.get(self.pos) {
            Some(record) => {
                *out = *record;
                self.pos += 1;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
pub enum LoadError {
    IOError(io::Error),
    // one message per offending line
    SyntaxError(Vec<String>),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::IOError(err) => write!(f, "{}", err),
            LoadError::SyntaxError(errors) => write!(f, "{}", errors.join("\n")),
        }
    }
}

impl std::error::Error for LoadError {}

pub fn load_from_file(path: &str) -> Result<Program, LoadError> {
    let input = fs::read_to_string(path).map_err(LoadError::IOError)?;
    load_from_string(&input)
}

/// Parse a trace: one instruction per line as four whitespace-separated
/// signed integers `op_code dest_reg src1 src2`, where -1 marks an absent
/// operand. Blank lines and `#` comments are skipped.
pub fn load_from_string(input: &str) -> Result<Program, LoadError> {
    let line_pattern = Regex::new(r"^(-?\d+)\s+(-?\d+)\s+(-?\d+)\s+(-?\d+)$").unwrap();

    let mut code = Vec::new();
    let mut errors = Vec::new();

    for (line_index, raw_line) in input.lines().enumerate() {
        let line = match raw_line.find('#') {
            Some(comment_start) => &raw_line[..comment_start],
            None => raw_line,
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let captures = match line_pattern.captures(line) {
            Some(captures) => captures,
            None => {
                errors.push(format!(
                    "line {}: expected 'op_code dest_reg src1 src2', got '{}'",
                    line_index + 1,
                    line
                ));
                continue;
            }
        };

        let fields: Result<Vec<i32>, _> = (1..=4)
            .map(|group| captures[group].parse::<i32>())
            .collect();
        match fields {
            Ok(fields) => code.push(TraceInstr {
                op_code: fields[0],
                dest_reg: fields[1],
                src_reg: [fields[2], fields[3]],
            }),
            Err(_) => errors.push(format!(
                "line {}: value out of range in '{}'",
                line_index + 1,
                line
            )),
        }
    }

    if errors.is_empty() {
        Ok(Program { code })
    } else {
        Err(LoadError::SyntaxError(errors))
    }
}
