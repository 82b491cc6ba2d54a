//! A tiny interpreter for the instruction subset the code generator emits.
//! It lets the integration tests "run" a listing without an assembler.

use std::collections::HashMap;

const STACK_TOP: i64 = 0x10000;
const CALLER_RBP: i64 = 0x7777;

#[derive(Debug, Default)]
struct Machine {
  rax: u32,
  rdi: u32,
  rbp: i64,
  rsp: i64,
  memory: HashMap<i64, i64>,
}

impl Machine {
  fn push(&mut self, value: i64) {
    self.rsp -= 8;
    self.memory.insert(self.rsp, value);
  }

  fn pop(&mut self) -> i64 {
    let value = self.memory.get(&self.rsp).copied().unwrap_or_default();
    self.rsp += 8;
    value
  }
}

/// `-N(%rbp)` -> `N`.
fn frame_offset(operand: &str) -> i64 {
  operand
    .strip_prefix('-')
    .and_then(|s| s.strip_suffix("(%rbp)"))
    .and_then(|s| s.parse().ok())
    .unwrap_or_else(|| panic!("unsupported memory operand {operand}"))
}

/// Execute `entry` and return the 32-bit value in `%eax` at its `ret`.
pub fn run(asm: &str, entry: &str) -> i32 {
  let lines: Vec<&str> = asm.lines().map(str::trim).collect();
  let start = lines
    .iter()
    .position(|l| *l == format!("{entry}:"))
    .unwrap_or_else(|| panic!("no label {entry}"));

  let mut m = Machine {
    rbp: CALLER_RBP,
    rsp: STACK_TOP,
    ..Machine::default()
  };

  for line in &lines[start + 1..] {
    if line.is_empty() || line.starts_with('#') || line.starts_with('.') {
      continue;
    }
    let (op, operands) = line.split_once(' ').unwrap_or((line, ""));
    let args: Vec<&str> = operands.split(", ").map(str::trim).collect();
    match (op, args.as_slice()) {
      ("push", ["%rbp"]) => m.push(m.rbp),
      ("push", ["%rax"]) => m.push(i64::from(m.rax)),
      ("pop", ["%rbp"]) => m.rbp = m.pop(),
      ("pop", ["%rax"]) => m.rax = m.pop() as u32,
      ("mov", ["%rsp", "%rbp"]) => m.rbp = m.rsp,
      ("mov", ["%rbp", "%rsp"]) => m.rsp = m.rbp,
      ("sub", [imm, "%rsp"]) => m.rsp -= imm.trim_start_matches('$').parse::<i64>().unwrap(),
      ("movl", [src, "%eax"]) if src.starts_with('$') => {
        m.rax = src.trim_start_matches('$').parse::<u64>().unwrap() as u32;
      }
      ("movl", ["%eax", "%edi"]) => m.rdi = m.rax,
      ("movl", ["%eax", dst]) => {
        let addr = m.rbp - frame_offset(dst);
        m.memory.insert(addr, i64::from(m.rax));
      }
      ("movl", [src, "%eax"]) => {
        let addr = m.rbp - frame_offset(src);
        m.rax = m.memory.get(&addr).copied().unwrap_or_default() as u32;
      }
      ("addl", ["%edi", "%eax"]) => m.rax = m.rax.wrapping_add(m.rdi),
      ("imull", ["%edi", "%eax"]) => m.rax = (m.rax as i32).wrapping_mul(m.rdi as i32) as u32,
      ("ret", _) => {
        assert_eq!(m.rsp, STACK_TOP, "unbalanced stack at ret");
        assert_eq!(m.rbp, CALLER_RBP, "caller frame pointer not restored");
        return m.rax as i32;
      }
      _ => panic!("unsupported instruction: {line}"),
    }
  }
  panic!("fell off the end of {entry} without ret");
}
