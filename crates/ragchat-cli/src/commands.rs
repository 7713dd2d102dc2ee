use ragchat_session::SessionStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    NewSession,
    ListSessions,
    Switch(String),
    Delete(Option<String>),
    Help,
    Quit,
}

impl Command {
    pub const HELP: &'static [(&'static str, &'static str)] = &[
        ("/new", "Start a new session"),
        ("/list", "List sessions, newest first"),
        ("/switch <n|id>", "Switch to a session by list number or id prefix"),
        ("/delete [n|id]", "Delete a session (the active one by default)"),
        ("/help", "Show this help"),
        ("/quit", "Exit"),
    ];
}

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Command(Command),
    Question(String),
    Unknown(String),
    Empty,
}

pub fn parse(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Input::Question(line.to_string());
    };

    let mut words = rest.split_whitespace();
    let name = words.next().unwrap_or_default();
    let arg = words.next().map(ToString::to_string);

    let command = match (name, arg) {
        ("new", _) => Command::NewSession,
        ("list" | "ls", _) => Command::ListSessions,
        ("switch" | "s", Some(target)) => Command::Switch(target),
        ("delete" | "rm", target) => Command::Delete(target),
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit" | "q", _) => Command::Quit,
        _ => return Input::Unknown(line.to_string()),
    };
    Input::Command(command)
}

/// Find a session by 1-based position in the listing, exact id, or unique
/// id prefix.
pub fn resolve_session(store: &SessionStore, target: &str) -> Option<String> {
    if let Ok(n) = target.parse::<usize>()
        && let Some(session) = n.checked_sub(1).and_then(|index| store.list().nth(index))
    {
        return Some(session.id.clone());
    }

    if store.contains(target) {
        return Some(target.to_string());
    }

    let mut matches = store.list().filter(|session| session.id.starts_with(target));
    match (matches.next(), matches.next()) {
        (Some(session), None) => Some(session.id.clone()),
        _ => None,
    }
}
