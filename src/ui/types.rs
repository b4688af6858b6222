use crate::session::types::ReportWindow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Toggle,
    Faster,
    Slower,
    Stats,
    Report(ReportWindow),
    Help,
    Quit,
    Unknown(String),
}

impl UserCommand {
    pub fn parse(line: &str) -> UserCommand {
        let mut words = line.split_whitespace();
        let command = words.next().map(str::to_ascii_lowercase);

        match command.as_deref() {
            None | Some("enter") | Some("toggle") => UserCommand::Toggle,
            Some("+") | Some("faster") => UserCommand::Faster,
            Some("-") | Some("slower") => UserCommand::Slower,
            Some("stats") => UserCommand::Stats,
            Some("report") => {
                let window = words.next().map(str::to_ascii_lowercase);
                match window.as_deref() {
                    None | Some("today") => UserCommand::Report(ReportWindow::Today),
                    Some("week") => UserCommand::Report(ReportWindow::ThisWeek),
                    Some("all") => UserCommand::Report(ReportWindow::All),
                    Some(_) => UserCommand::Unknown(line.trim().to_string()),
                }
            },
            Some("help") | Some("?") => UserCommand::Help,
            Some("quit") | Some("q") | Some("exit") => UserCommand::Quit,
            Some(_) => UserCommand::Unknown(line.trim().to_string()),
        }
    }
}

pub const HELP_TEXT: &str = "\
Commands:
  [Enter], toggle          start or stop the treadmill
  +, faster                increase speed
  -, slower                decrease speed
  stats                    fetch the current stats
  report [today|week|all]  print totals of recorded sessions
  help                     show this text
  quit, q, exit            stop and quit";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_line_toggles() {
        assert_eq!(UserCommand::parse(""), UserCommand::Toggle);
        assert_eq!(UserCommand::parse("   \n"), UserCommand::Toggle);
        assert_eq!(UserCommand::parse("Toggle"), UserCommand::Toggle);
    }

    #[test]
    fn speed_commands() {
        assert_eq!(UserCommand::parse("+"), UserCommand::Faster);
        assert_eq!(UserCommand::parse("faster"), UserCommand::Faster);
        assert_eq!(UserCommand::parse(" - "), UserCommand::Slower);
        assert_eq!(UserCommand::parse("SLOWER"), UserCommand::Slower);
    }

    #[test]
    fn report_defaults_to_today() {
        assert_eq!(UserCommand::parse("report"), UserCommand::Report(ReportWindow::Today));
        assert_eq!(UserCommand::parse("report week"), UserCommand::Report(ReportWindow::ThisWeek));
        assert_eq!(UserCommand::parse("report all"), UserCommand::Report(ReportWindow::All));
        assert_eq!(UserCommand::parse("report yesterday"), UserCommand::Unknown(String::from("report yesterday")));
    }

    #[test]
    fn quit_aliases() {
        for line in ["quit", "q", "exit"] {
            assert_eq!(UserCommand::parse(line), UserCommand::Quit);
        }
        assert_eq!(UserCommand::parse("jump"), UserCommand::Unknown(String::from("jump")));
    }
}
