//! Command declarations, argument validation and the command tables.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

/// How many arguments a command takes.
///
/// Arguments are split on whitespace only; there is no quoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly `n` words.
    Exact(usize),
    /// Between `min` and `max` words, inclusive.
    Range(usize, usize),
    /// `n` words, then an optional rest of the line.
    Rest(usize),
    /// `n` words, then a rest of the line that must be present.
    RestRequired(usize),
    /// The whole remainder as one optional argument.
    Any,
    /// The whole remainder as one argument that must be present.
    Required,
}

impl Default for Arity {
    fn default() -> Self {
        Self::Exact(0)
    }
}

impl Arity {
    /// Split `args` into positional arguments, or `None` if they do not
    /// fit.
    pub fn validate(&self, args: &str) -> Option<Vec<String>> {
        let (min, max) = match *self {
            Self::Any => return Some(whole(args)),
            Self::Required => return Some(whole(args)).filter(|v| !v.is_empty()),
            Self::Rest(n) => {
                let split = split_max(args, n);
                return (split.len() == n || split.len() == n + 1).then_some(split);
            }
            Self::RestRequired(n) => {
                let split = split_max(args, n);
                return (split.len() == n + 1).then_some(split);
            }
            Self::Exact(n) => (n, n),
            Self::Range(min, max) => (min, max),
        };

        if max == 0 {
            return args.is_empty().then(Vec::new);
        }

        let split: Vec<String> = args.split_whitespace().map(str::to_owned).collect();
        (min..=max).contains(&split.len()).then_some(split)
    }
}

fn whole(args: &str) -> Vec<String> {
    if args.is_empty() {
        Vec::new()
    } else {
        vec![args.to_owned()]
    }
}

/// Split on whitespace at most `max` times; the last piece keeps its
/// inner whitespace.
fn split_max(s: &str, max: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = s.trim_start();

    while !rest.is_empty() {
        if out.len() == max {
            out.push(rest.to_owned());
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                out.push(rest[..end].to_owned());
                rest = rest[end..].trim_start();
            }
            None => {
                out.push(rest.to_owned());
                break;
            }
        }
    }
    out
}

/// A command a module offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: String,
    pub arity: Arity,
    /// Usage line without the command prefix, e.g. `join <channel> <network>`.
    pub synopsis: String,
    pub help: String,
    pub aliases: Vec<String>,
}

impl CommandSpec {
    /// A command without arguments; the synopsis is its name.
    pub fn new(name: &str, help: &str) -> Self {
        Self {
            name: name.to_owned(),
            arity: Arity::default(),
            synopsis: name.to_owned(),
            help: help.to_owned(),
            aliases: Vec::new(),
        }
    }

    #[must_use]
    pub fn arity(mut self, arity: Arity) -> Self {
        self.arity = arity;
        self
    }

    #[must_use]
    pub fn synopsis(mut self, synopsis: &str) -> Self {
        self.synopsis = synopsis.to_owned();
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: &str) -> Self {
        self.aliases.push(alias.to_owned());
        self
    }
}

/// A registered command and whatever runs it.
#[derive(Debug)]
pub struct Registered<H> {
    pub spec: CommandSpec,
    pub handler: H,
}

/// Which table a lookup uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Admin,
    Public,
}

/// Admin and public command tables, keyed by name and alias.
///
/// Public commands are available to admins too.
#[derive(Debug)]
pub struct CommandRegistry<H> {
    admin: HashMap<String, Arc<Registered<H>>>,
    public: HashMap<String, Arc<Registered<H>>>,
}

impl<H> Default for CommandRegistry<H> {
    fn default() -> Self {
        Self {
            admin: HashMap::new(),
            public: HashMap::new(),
        }
    }
}

impl<H> CommandRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command; a later registration of the same name wins.
    pub fn register(&mut self, tier: Tier, spec: CommandSpec, handler: H) {
        let names: Vec<String> = std::iter::once(spec.name.clone())
            .chain(spec.aliases.iter().cloned())
            .collect();
        let entry = Arc::new(Registered { spec, handler });

        for name in names {
            if tier == Tier::Public {
                self.public.insert(name.clone(), Arc::clone(&entry));
            }
            if self.admin.insert(name.clone(), Arc::clone(&entry)).is_some() {
                debug!(command = %name, "command registered twice, replacing");
            }
        }
    }

    fn table(&self, tier: Tier) -> &HashMap<String, Arc<Registered<H>>> {
        match tier {
            Tier::Admin => &self.admin,
            Tier::Public => &self.public,
        }
    }

    pub fn get(&self, tier: Tier, name: &str) -> Option<&Arc<Registered<H>>> {
        self.table(tier).get(name)
    }

    /// Sorted command names (aliases included).
    pub fn names(&self, tier: Tier) -> Vec<String> {
        let mut names: Vec<String> = self.table(tier).keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self, tier: Tier) -> bool {
        self.table(tier).is_empty()
    }
}
