use std::cell::RefCell;
use std::str::Chars;

use colored::{ColoredString, Colorize};

use crate::log::LogEntry;
use crate::runtime::Machine;

#[macro_export]
macro_rules! tprintln {
    ( $cond:expr ) => {{
        #[allow(unused_imports)]
        use $crate::output::Condition::*;
        $crate::output::Output::Trace($cond).print_str("\n");
    }};
    ( $cond:expr, $fmt:literal $($tt:tt)* ) => {{
        #[allow(unused_imports)]
        use $crate::output::Condition::*;
        let s = format!(
            concat!($fmt, "\n")
            $($tt)*
        );
        $crate::output::Output::Trace($cond).print_str(&s);
    }};
    // Trigger type error if missing condition
    ( $fmt:literal $($tt:tt)* ) => {{
        $crate::output::Output::Trace($fmt);
    }};
}

/// Where host text goes. Program output to stdout, everything about the machine to stderr.
#[derive(Clone, Copy, Debug)]
pub enum Output {
    Normal,
    Trace(Condition),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    /// Printed in every mode, without colour if `--minimal`
    Always,
    /// Decoration, dropped entirely if `--minimal`
    Sometimes,
}

struct Decolored<'a> {
    chars: Chars<'a>,
}

impl Output {
    thread_local! {
        static IS_LINE_START: RefCell<bool> = const { RefCell::new(true) };
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
    }

    pub fn set_line_start(new_value: bool) -> bool {
        Self::IS_LINE_START.with(|value| value.replace(new_value))
    }
    /// Private. Use [`Output::start_new_line`].
    fn is_line_start() -> bool {
        Self::IS_LINE_START.with(|value| *value.borrow())
    }
    pub fn set_minimal(new_value: bool) -> bool {
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }
    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }

    fn set_line_start_from_str(string: &str) {
        let last = Decolored::new(string).last();
        if let Some(ch) = last {
            Output::set_line_start(ch == '\n');
        }
    }

    pub fn print_str(&self, string: &str) {
        match self {
            Self::Normal => {
                // Whatever the program emitted, unchanged
                print!("{}", string);
                Self::set_line_start_from_str(string);
            }
            Self::Trace(condition) => match (Self::is_minimal(), *condition) {
                (false, _) => {
                    eprint!("{}", string);
                    Self::set_line_start_from_str(string);
                }
                (true, Condition::Always) => {
                    eprint_colorless(string);
                    Self::set_line_start_from_str(string);
                }
                (true, Condition::Sometimes) => (),
            },
        }
    }

    pub fn start_new_line(&self) {
        if !Self::is_line_start() {
            self.print_str("\n");
        }
    }

    pub fn print_log_entry(&self, entry: &LogEntry) {
        let line: ColoredString = match entry {
            LogEntry::Context { title, time } => format!("[{title}:T{time}]").cyan().bold(),
            LogEntry::Step(step) => format!("    {step}").dimmed(),
            LogEntry::Info(info) => format!("[INFO]: {info}").green(),
            LogEntry::Warning(warning) => format!("[WARNING]: {warning}").yellow(),
            LogEntry::Error(error) => format!("[ERROR]: {error}").red().bold(),
        };
        self.start_new_line();
        self.print_str(&format!("{line}\n"));
    }

    pub fn print_log(&self, entries: &[LogEntry]) {
        for entry in entries {
            self.print_log_entry(entry);
        }
    }

    pub fn print_registers(&self, machine: &Machine) {
        let reg = machine.registers();
        let flags = machine.flags();
        let rows = [
            ("AC", reg.ac),
            ("DR", reg.dr),
            ("AR", reg.ar),
            ("IR", reg.ir),
            ("PC", reg.pc),
            ("TR", reg.tr),
            ("INPR", reg.inpr as u16),
            ("OUTR", reg.outr as u16),
        ];
        let bits = [
            ("E", flags.overflow),
            ("S", flags.stop),
            ("I", flags.indirection),
            ("R", flags.interrupt),
            ("IEN", flags.interrupt_enable),
            ("FGI", flags.input),
            ("FGO", flags.output),
        ];

        self.start_new_line();
        if Self::is_minimal() {
            for (name, value) in rows {
                self.print_str(&format!("{name} {value:04X}\n"));
            }
            self.print_str(&format!("SC {}\n", reg.time));
            for (name, set) in bits {
                self.print_str(&format!("{name} {}\n", set as u8));
            }
            return;
        }

        self.print_str("\x1b[2m┌──────────────────────────────────────┐\x1b[0m\n");
        self.print_str(
            "\x1b[2m│          \x1b[3mhex     int    uint    char\x1b[0m\x1b[2m │\x1b[0m\n",
        );
        for (name, value) in rows {
            self.print_str("\x1b[2m│\x1b[0m");
            self.print_str(&format!(" \x1b[1m{name:<4}\x1b[0m  "));
            self.print_integer(value);
            self.print_str(" \x1b[2m│\x1b[0m\n");
        }
        self.print_str("\x1b[2m│\x1b[0m");
        let mut width = 0;
        for (name, set) in bits {
            let text = format!(" {name} {}", set as u8);
            width += text.len();
            self.print_str(&format!("\x1b[1m{text}\x1b[0m"));
        }
        let sc = format!("  SC {}", reg.time);
        width += sc.len();
        self.print_str(&sc);
        self.print_str(&" ".repeat(38usize.saturating_sub(width)));
        self.print_str("\x1b[2m│\x1b[0m\n");
        self.print_str("\x1b[2m└──────────────────────────────────────┘\x1b[0m\n");
    }

    pub fn print_integer(&self, value: u16) {
        if Self::is_minimal() {
            self.print_str(&format!("{}", value as i16));
            return;
        }
        self.print_str(&format!("0x{:04x}  ", value));
        self.print_str(&format!("{:-6}  ", value));
        self.print_str(&format!("{:-6}  ", value as i16));
        self.print_char_display(value);
    }

    fn print_char_display(&self, value: u16) {
        debug_assert!(
            !Self::is_minimal(),
            "`print_char_display` should not be called if `--minimal`"
        );
        self.print_str("   ");
        // Print 3 characters
        match value {
            0x00 => self.print_str("NUL"),
            0x08 => self.print_str("BS "),
            0x09 => self.print_str("HT "),
            0x0a => self.print_str("LF "),
            0x0d => self.print_str("CR "),
            0x1b => self.print_str("ESC"),
            0x7f => self.print_str("DEL"),

            0x20 => self.print_str("[_]"),

            0x21..=0x7e => self.print_str(&format!("{:<3}", value as u8 as char)),

            0x00..=0x7f => self.print_str("\x1b[2m───\x1b[0m"),
            0x0080.. => self.print_str("\x1b[2m┄┄┄\x1b[0m"),
        }
    }
}

impl<'a> Decolored<'a> {
    pub fn new(string: &'a str) -> Self {
        Self {
            chars: string.chars(),
        }
    }
}

impl<'a> Iterator for Decolored<'a> {
    type Item = char;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.next() {
            // Skip everything between '\x1b' and 'm' (inclusive)
            if ch == '\x1b' {
                while self.chars.next().is_some_and(|ch| ch != 'm') {}
                continue;
            }
            return Some(ch);
        }
        None
    }
}

fn eprint_colorless(string: &str) {
    eprint!("{}", Decolored::new(string).collect::<String>());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decolored() {
        assert_eq!(Decolored::new("abcdef").collect::<String>(), "abcdef");
        assert_eq!(
            Decolored::new("abc\x1b[0;2mdef\x1b[0m").collect::<String>(),
            "abcdef"
        );
        assert_eq!(Decolored::new("abc\x1b[0xyz").collect::<String>(), "abc");
        assert_eq!(
            Decolored::new("[INFO]: \x1b[1;32mLoaded\x1b[0m").collect::<String>(),
            "[INFO]: Loaded"
        );
    }

    #[test]
    fn minimal_flag_is_swapped() {
        assert!(!Output::set_minimal(true));
        assert!(Output::is_minimal());
        assert!(Output::set_minimal(false));
    }
}
