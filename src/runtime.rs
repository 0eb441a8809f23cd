use std::collections::VecDeque;
use std::fmt;

use crate::air::Air;
use crate::breakpoint::Breakpoints;
use crate::isa::{one_hot_index, Instruction, ADDRESS_MASK, ESCAPE_OPCODE, INDIRECT_BIT, MEMORY_SIZE};
use crate::log::{Log, LogEntry};

/// 4096 words, every access wraps to 12 bits.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Memory {
    cells: Box<[u16; MEMORY_SIZE]>,
}

impl Memory {
    pub fn new() -> Self {
        Memory {
            cells: Box::new([0; MEMORY_SIZE]),
        }
    }

    #[inline]
    pub fn read(&self, address: u16) -> u16 {
        self.cells[(address & ADDRESS_MASK) as usize]
    }

    #[inline]
    fn write(&mut self, address: u16, value: u16) {
        self.cells[(address & ADDRESS_MASK) as usize] = value;
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Registers {
    /// Accumulator
    pub ac: u16,
    /// Data register, memory operands pass through here
    pub dr: u16,
    /// Address register, 12 bits
    pub ar: u16,
    /// Instruction register
    pub ir: u16,
    /// Program counter, 12 bits
    pub pc: u16,
    /// Temporary register, holds the return address during an interrupt cycle
    pub tr: u16,
    pub inpr: u8,
    pub outr: u8,
    /// Sequence counter: next time pulse within the current cycle
    pub time: u8,
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Flags {
    /// I, indirect bit of the current instruction
    pub indirection: bool,
    /// S, machine halted
    pub stop: bool,
    /// E, carry out of the accumulator
    pub overflow: bool,
    /// R, interrupt cycle pending
    pub interrupt: bool,
    /// IEN
    pub interrupt_enable: bool,
    /// FGI, input character ready in INPR
    pub input: bool,
    /// FGO, output device ready for a character
    pub output: bool,
}

/// Read-only copy of the whole architectural state.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Snapshot {
    pub memory: Box<[u16; MEMORY_SIZE]>,
    pub registers: Registers,
    pub flags: Flags,
    /// Characters not yet taken into INPR
    pub input: String,
    /// Every character emitted by `OUT`
    pub output: String,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Status {
    Running,
    Halted,
}

/// Why `run` returned.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Stop {
    Halted,
    /// Paused before fetching the instruction at this address
    Breakpoint(u16),
    /// Step budget used up
    BudgetExhausted,
    /// Tripwire returned false
    Cancelled,
}

/// Defects which cannot happen for words produced by the assembler.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MachineError {
    /// Opcode 7 with a low-bit pattern that selects no operation.
    Decode { address: u16, word: u16 },
}

impl std::error::Error for MachineError {}

impl fmt::Display for MachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode { address, word } => write!(
                f,
                "cannot decode instruction 0x{word:04X} at address 0x{address:03X}"
            ),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Cycle {
    Instruction,
    Interrupt,
}

/// Outcome of a single clock pulse.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Tick {
    Next,
    /// Last pulse of the cycle, SC returns to 0
    Done,
}

/// The basic computer, advanced one clock pulse at a time.
#[derive(Debug)]
pub struct Machine {
    mem: Memory,
    reg: Registers,
    flags: Flags,
    /// Decoder output D, the opcode of the instruction in IR
    opcode: u16,
    cycle: Cycle,
    /// Address the current instruction was fetched from
    instr_addr: u16,
    input: VecDeque<u8>,
    output: String,
    log: Log,
    /// Record every pulse in the log, not only loads, halts and errors
    trace: bool,
    breakpoints: Breakpoints,
    /// Breakpoint reported by the last `run`, passed on the next one
    current_breakpoint: Option<u16>,
    /// Completed instruction and interrupt cycles
    cycles: u64,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Machine {
            mem: Memory::new(),
            reg: Registers::default(),
            flags: Flags {
                output: true,
                ..Flags::default()
            },
            opcode: 0,
            cycle: Cycle::Instruction,
            instr_addr: 0,
            input: VecDeque::new(),
            output: String::new(),
            log: Log::new(),
            trace: false,
            breakpoints: Breakpoints::new(),
            current_breakpoint: None,
            cycles: 0,
        }
    }

    /// Zero memory and registers. The log, breakpoints and trace setting survive.
    pub fn reset(&mut self) {
        self.mem = Memory::new();
        self.reg = Registers::default();
        self.flags = Flags {
            output: true,
            ..Flags::default()
        };
        self.opcode = 0;
        self.cycle = Cycle::Instruction;
        self.instr_addr = 0;
        self.input.clear();
        self.output.clear();
        self.current_breakpoint = None;
        self.cycles = 0;
    }

    /// Reset, then write every assembled word and point PC at the entry address.
    pub fn load(&mut self, air: &Air) {
        self.reset();
        for word in air {
            self.mem.write(word.address, word.word);
        }
        self.reg.pc = air.entry() & ADDRESS_MASK;
        self.log.info(format!(
            "Loaded {} word{}, entry at 0x{:03X}.",
            air.len(),
            if air.len() == 1 { "" } else { "s" },
            self.reg.pc
        ));
    }

    /// Queue characters for the input device. Anything outside 8 bits is truncated.
    pub fn push_input(&mut self, text: &str) {
        for ch in text.chars() {
            if (ch as u32) > 0xFF {
                self.log.warning(format!(
                    "Input character `{ch}` does not fit in INPR, truncated to 8 bits."
                ));
            }
            self.input.push_back(ch as u32 as u8);
        }
    }

    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            memory: self.mem.cells.clone(),
            registers: self.reg,
            flags: self.flags,
            input: self.input.iter().map(|&b| b as char).collect(),
            output: self.output.clone(),
        }
    }

    pub fn registers(&self) -> &Registers {
        &self.reg
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn log(&self) -> &Log {
        &self.log
    }

    pub fn take_log(&mut self) -> Vec<LogEntry> {
        self.log.take()
    }

    pub fn breakpoints_mut(&mut self) -> &mut Breakpoints {
        &mut self.breakpoints
    }

    pub fn is_halted(&self) -> bool {
        self.flags.stop
    }

    /// No cycle is in progress, the next pulse is T0.
    pub fn at_cycle_boundary(&self) -> bool {
        self.reg.time == 0
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn status(&self) -> Status {
        if self.flags.stop {
            Status::Halted
        } else {
            Status::Running
        }
    }

    /// Advance exactly one clock pulse. Does nothing once halted.
    pub fn micro_step(&mut self) -> Result<Status, MachineError> {
        if self.flags.stop {
            return Ok(Status::Halted);
        }
        if self.at_cycle_boundary() {
            self.begin_cycle();
        }

        let tick = match self.cycle {
            Cycle::Interrupt => self.interrupt_pulse(),
            Cycle::Instruction => self.instruction_pulse()?,
        };
        match tick {
            Tick::Next => self.reg.time += 1,
            Tick::Done => self.end_cycle(),
        }
        Ok(self.status())
    }

    /// Finish the current cycle: one whole instruction, or the interrupt cycle if one is pending.
    pub fn macro_step(&mut self) -> Result<Status, MachineError> {
        loop {
            let status = self.micro_step()?;
            if status == Status::Halted || self.at_cycle_boundary() {
                return Ok(status);
            }
        }
    }

    /// Macro-step until halted, a breakpoint, or `tripwire` returns false.
    ///
    /// `tripwire` is polled before every macro-step.
    pub fn run_while(
        &mut self,
        mut tripwire: impl FnMut(&Machine) -> bool,
    ) -> Result<Stop, MachineError> {
        loop {
            if self.flags.stop {
                return Ok(Stop::Halted);
            }
            let pc = self.reg.pc;
            if self.at_cycle_boundary()
                && !self.flags.interrupt
                && self.breakpoints.contains(pc)
            {
                // Resuming from this breakpoint lets it pass once
                if self.current_breakpoint.take() != Some(pc) {
                    self.current_breakpoint = Some(pc);
                    self.log.warning(format!(
                        "Reached breakpoint at 0x{pc:03X}. Pausing execution."
                    ));
                    return Ok(Stop::Breakpoint(pc));
                }
            }
            if !tripwire(self) {
                return Ok(Stop::Cancelled);
            }
            self.macro_step()?;
        }
    }

    /// Run for at most `max_steps` macro-steps.
    pub fn run(&mut self, max_steps: u64) -> Result<Stop, MachineError> {
        let start = self.cycles;
        let stop = self.run_while(|machine| machine.cycles - start < max_steps)?;
        if stop == Stop::Cancelled {
            self.log.warning(format!(
                "Step budget of {max_steps} exhausted at 0x{:03X}.",
                self.reg.pc
            ));
            return Ok(Stop::BudgetExhausted);
        }
        Ok(stop)
    }

    fn step(&mut self, transfer: &'static str) {
        if self.trace {
            self.log.step(transfer);
        }
    }

    fn context(&mut self, title: &'static str) {
        if self.trace {
            self.log.context(title, self.reg.time);
        }
    }

    /// Devices act between cycles; a pending interrupt replaces the next fetch.
    fn begin_cycle(&mut self) {
        if !self.flags.input {
            if let Some(byte) = self.input.pop_front() {
                self.reg.inpr = byte;
                self.flags.input = true;
                if self.trace {
                    self.log.info(format!(
                        "Input device: INPR ← 0x{byte:02X}, FGI ← 1."
                    ));
                }
            }
        }
        if !self.flags.output {
            self.flags.output = true;
            if self.trace {
                self.log.info("Output device: FGO ← 1.");
            }
        }
        self.cycle = if self.flags.interrupt {
            Cycle::Interrupt
        } else {
            Cycle::Instruction
        };
    }

    fn end_cycle(&mut self) {
        self.reg.time = 0;
        self.cycles += 1;

        match self.cycle {
            Cycle::Instruction if self.trace => {
                let text = match Instruction::decode(self.reg.ir) {
                    Some(instr) => instr.to_string(),
                    None => format!("0x{:04X}", self.reg.ir),
                };
                self.log
                    .info(format!("Executed {text} at 0x{:03X}.", self.instr_addr));
            }
            Cycle::Interrupt => {
                let saved = self.mem.read(0);
                self.log.info(format!(
                    "Interrupt serviced, return address 0x{saved:03X} saved at 0x000."
                ));
            }
            _ => {}
        }

        if self.flags.stop {
            self.log
                .info(format!("Halted at 0x{:03X}.", self.instr_addr));
            return;
        }

        // Interrupt check, a pending R turns the next cycle into an interrupt cycle
        if self.flags.interrupt_enable
            && (self.flags.input || self.flags.output)
            && !self.flags.interrupt
        {
            self.flags.interrupt = true;
            self.step("R ← 1");
        }
    }

    fn decode_error(&mut self) -> MachineError {
        let err = MachineError::Decode {
            address: self.instr_addr,
            word: self.reg.ir,
        };
        self.log.error(format!("Fatal: {err}. Machine stopped."));
        self.flags.stop = true;
        self.reg.time = 0;
        err
    }

    #[inline]
    fn increment_pc(&mut self) {
        self.reg.pc = self.reg.pc.wrapping_add(1) & ADDRESS_MASK;
    }

    fn instruction_pulse(&mut self) -> Result<Tick, MachineError> {
        match self.reg.time {
            0 => {
                self.context("FETCH");
                self.current_breakpoint = None;
                self.reg.ar = self.reg.pc;
                self.instr_addr = self.reg.pc;
                self.step("AR ← PC");
                Ok(Tick::Next)
            }
            1 => {
                self.context("FETCH");
                self.reg.ir = self.mem.read(self.reg.ar);
                self.increment_pc();
                self.step("IR ← M[AR], PC ← PC + 1");
                Ok(Tick::Next)
            }
            2 => {
                self.context("DECODE");
                self.opcode = (self.reg.ir >> 12) & 0b111;
                self.flags.indirection = self.reg.ir & INDIRECT_BIT != 0;
                self.reg.ar = self.reg.ir & ADDRESS_MASK;
                self.step("D0..D7 ← decode IR(12-14), AR ← IR(0-11), I ← IR(15)");
                Ok(Tick::Next)
            }
            3 if self.opcode == ESCAPE_OPCODE => {
                self.context("EXECUTE");
                self.execute_escape()
            }
            3 => {
                if self.flags.indirection {
                    self.context("INDIRECT");
                    self.reg.ar = self.mem.read(self.reg.ar) & ADDRESS_MASK;
                    self.step("AR ← M[AR]");
                } else {
                    self.context("DECODE");
                    self.step("nothing (direct address)");
                }
                Ok(Tick::Next)
            }
            _ => {
                self.context("EXECUTE");
                match Self::MEMORY_OPS.get(self.opcode as usize).copied() {
                    Some(op) => Ok(op(self)),
                    None => Err(self.decode_error()),
                }
            }
        }
    }

    fn interrupt_pulse(&mut self) -> Tick {
        self.context("INTERRUPT");
        match self.reg.time {
            0 => {
                self.reg.ar = 0;
                self.reg.tr = self.reg.pc;
                self.step("AR ← 0, TR ← PC");
                Tick::Next
            }
            1 => {
                self.mem.write(self.reg.ar, self.reg.tr);
                self.reg.pc = 0;
                self.step("M[AR] ← TR, PC ← 0");
                Tick::Next
            }
            _ => {
                self.increment_pc();
                self.flags.interrupt_enable = false;
                self.flags.interrupt = false;
                self.step("PC ← PC + 1, IEN ← 0, R ← 0, SC ← 0");
                Tick::Done
            }
        }
    }

    /// Register-reference (`I = 0`) or IO (`I = 1`) operation selected by the one-hot low bits.
    fn execute_escape(&mut self) -> Result<Tick, MachineError> {
        let index = one_hot_index(self.reg.ir);
        let op = match (self.flags.indirection, index) {
            (false, Some(i)) => Self::REGISTER_OPS[i],
            (true, Some(i)) if i < Self::IO_OPS.len() => Self::IO_OPS[i],
            _ => return Err(self.decode_error()),
        };
        op(self);
        Ok(Tick::Done)
    }

    /// Indexed by opcode. Called from T4 on, `AR` already holds the effective address.
    const MEMORY_OPS: [fn(&mut Machine) -> Tick; 7] = [
        Self::and, // 0
        Self::add, // 1
        Self::lda, // 2
        Self::sta, // 3
        Self::bun, // 4
        Self::bsa, // 5
        Self::isz, // 6
    ];

    /// Indexed by one-hot bit, bit 11 first.
    const REGISTER_OPS: [fn(&mut Machine); 12] = [
        Self::cla, // 0x800
        Self::cle, // 0x400
        Self::cma, // 0x200
        Self::cme, // 0x100
        Self::cir, // 0x080
        Self::cil, // 0x040
        Self::inc, // 0x020
        Self::spa, // 0x010
        Self::sna, // 0x008
        Self::sza, // 0x004
        Self::sze, // 0x002
        Self::hlt, // 0x001
    ];

    const IO_OPS: [fn(&mut Machine); 6] = [
        Self::inp, // 0x800
        Self::out, // 0x400
        Self::ski, // 0x200
        Self::sko, // 0x100
        Self::ion, // 0x080
        Self::iof, // 0x040
    ];

    fn read_dr(&mut self) {
        self.reg.dr = self.mem.read(self.reg.ar);
        self.step("DR ← M[AR]");
    }

    fn and(&mut self) -> Tick {
        if self.reg.time == 4 {
            self.read_dr();
            return Tick::Next;
        }
        self.reg.ac &= self.reg.dr;
        self.step("AC ← AC ∧ DR, SC ← 0");
        Tick::Done
    }

    fn add(&mut self) -> Tick {
        if self.reg.time == 4 {
            self.read_dr();
            return Tick::Next;
        }
        let (sum, carry) = self.reg.ac.overflowing_add(self.reg.dr);
        self.reg.ac = sum;
        self.flags.overflow = carry;
        self.step("AC ← AC + DR, E ← Cout, SC ← 0");
        Tick::Done
    }

    fn lda(&mut self) -> Tick {
        if self.reg.time == 4 {
            self.read_dr();
            return Tick::Next;
        }
        self.reg.ac = self.reg.dr;
        self.step("AC ← DR, SC ← 0");
        Tick::Done
    }

    fn sta(&mut self) -> Tick {
        self.mem.write(self.reg.ar, self.reg.ac);
        self.step("M[AR] ← AC, SC ← 0");
        Tick::Done
    }

    fn bun(&mut self) -> Tick {
        self.reg.pc = self.reg.ar;
        self.step("PC ← AR, SC ← 0");
        Tick::Done
    }

    fn bsa(&mut self) -> Tick {
        if self.reg.time == 4 {
            self.mem.write(self.reg.ar, self.reg.pc);
            self.reg.ar = self.reg.ar.wrapping_add(1) & ADDRESS_MASK;
            self.step("M[AR] ← PC, AR ← AR + 1");
            return Tick::Next;
        }
        self.reg.pc = self.reg.ar;
        self.step("PC ← AR, SC ← 0");
        Tick::Done
    }

    fn isz(&mut self) -> Tick {
        match self.reg.time {
            4 => {
                self.read_dr();
                Tick::Next
            }
            5 => {
                self.reg.dr = self.reg.dr.wrapping_add(1);
                self.step("DR ← DR + 1");
                Tick::Next
            }
            _ => {
                self.mem.write(self.reg.ar, self.reg.dr);
                if self.reg.dr == 0 {
                    self.increment_pc();
                    self.step("M[AR] ← DR, DR = 0 so PC ← PC + 1, SC ← 0");
                } else {
                    self.step("M[AR] ← DR, SC ← 0");
                }
                Tick::Done
            }
        }
    }

    /// Shared by every skip instruction.
    fn skip_if(&mut self, condition: bool) {
        if condition {
            self.increment_pc();
            self.step("PC ← PC + 1, SC ← 0");
        } else {
            self.step("no skip, SC ← 0");
        }
    }

    fn cla(&mut self) {
        self.reg.ac = 0;
        self.step("AC ← 0, SC ← 0");
    }

    fn cle(&mut self) {
        self.flags.overflow = false;
        self.step("E ← 0, SC ← 0");
    }

    fn cma(&mut self) {
        self.reg.ac = !self.reg.ac;
        self.step("AC ← AC', SC ← 0");
    }

    fn cme(&mut self) {
        self.flags.overflow = !self.flags.overflow;
        self.step("E ← E', SC ← 0");
    }

    fn cir(&mut self) {
        let e = self.flags.overflow as u16;
        self.flags.overflow = self.reg.ac & 1 != 0;
        self.reg.ac = (self.reg.ac >> 1) | (e << 15);
        self.step("AC ← shr AC, AC(15) ← E, E ← AC(0), SC ← 0");
    }

    fn cil(&mut self) {
        let e = self.flags.overflow as u16;
        self.flags.overflow = self.reg.ac & 0x8000 != 0;
        self.reg.ac = (self.reg.ac << 1) | e;
        self.step("AC ← shl AC, AC(0) ← E, E ← AC(15), SC ← 0");
    }

    fn inc(&mut self) {
        self.reg.ac = self.reg.ac.wrapping_add(1);
        self.step("AC ← AC + 1, SC ← 0");
    }

    fn spa(&mut self) {
        self.skip_if(self.reg.ac & 0x8000 == 0);
    }

    fn sna(&mut self) {
        self.skip_if(self.reg.ac & 0x8000 != 0);
    }

    fn sza(&mut self) {
        self.skip_if(self.reg.ac == 0);
    }

    fn sze(&mut self) {
        self.skip_if(!self.flags.overflow);
    }

    fn hlt(&mut self) {
        self.flags.stop = true;
        self.step("S ← 1, SC ← 0");
    }

    fn inp(&mut self) {
        self.reg.ac = (self.reg.ac & 0xFF00) | self.reg.inpr as u16;
        self.flags.input = false;
        self.step("AC(0-7) ← INPR, FGI ← 0, SC ← 0");
    }

    fn out(&mut self) {
        self.reg.outr = (self.reg.ac & 0xFF) as u8;
        self.flags.output = false;
        self.output.push(self.reg.outr as char);
        self.step("OUTR ← AC(0-7), FGO ← 0, SC ← 0");
    }

    fn ski(&mut self) {
        self.skip_if(self.flags.input);
    }

    fn sko(&mut self) {
        self.skip_if(self.flags.output);
    }

    fn ion(&mut self) {
        self.flags.interrupt_enable = true;
        self.step("IEN ← 1, SC ← 0");
    }

    fn iof(&mut self) {
        self.flags.interrupt_enable = false;
        self.step("IEN ← 0, SC ← 0");
    }
}
