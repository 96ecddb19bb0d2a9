//! Pretty printing of compiled programs, for debugging and snapshots.

use super::ir::Program;
use super::ir::RuleSpec;
use super::ir::ScheduleSpec;
use super::ir::SensorSpec;

pub trait PrettyPrint {
    fn pretty_print(&self, indent: usize, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result;

    fn to_pretty_string(&self) -> String {
        struct Wrapper<'a, T: PrettyPrint + ?Sized>(&'a T);
        impl<T: PrettyPrint + ?Sized> std::fmt::Display for Wrapper<'_, T> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.pretty_print(0, f)
            }
        }
        Wrapper(self).to_string()
    }
}

fn write_indent(indent: usize, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    for _ in 0..indent {
        write!(f, "  ")?;
    }
    Ok(())
}

impl PrettyPrint for SensorSpec {
    fn pretty_print(&self, indent: usize, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_indent(indent, f)?;
        writeln!(f, "sensor \"{}\" {}", self.name, self.kind)
    }
}

impl PrettyPrint for ScheduleSpec {
    fn pretty_print(&self, indent: usize, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_indent(indent, f)?;
        writeln!(f, "schedule \"{}\" after {}", self.name, self.timer)?;
        write_indent(indent + 1, f)?;
        writeln!(f, "{}", self.command)
    }
}

impl PrettyPrint for RuleSpec {
    fn pretty_print(&self, indent: usize, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_indent(indent, f)?;
        writeln!(f, "rule \"{}\"", self.name)?;
        for condition in &self.conditions {
            write_indent(indent + 1, f)?;
            writeln!(f, "if {}", condition)?;
        }
        for action in &self.actions {
            write_indent(indent + 1, f)?;
            writeln!(f, "{}", action)?;
        }
        Ok(())
    }
}

impl PrettyPrint for Program {
    fn pretty_print(&self, indent: usize, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write_indent(indent, f)?;
        writeln!(f, "Program: {}", self.label)?;
        for sensor in &self.sensors {
            sensor.pretty_print(indent + 1, f)?;
        }
        for schedule in &self.schedules {
            schedule.pretty_print(indent + 1, f)?;
        }
        for rule in &self.rules {
            rule.pretty_print(indent + 1, f)?;
        }
        Ok(())
    }
}
