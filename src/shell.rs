//! Line commands for the terminal binary.
//!
//! Each input line parses into a [`Command`]; [`Shell::handle_command`] runs it against the
//! session and returns the text to print. Sheet edits go through the pure functions in
//! [`crate::sheet`] and [`crate::inventory`] and are then committed to the store.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::auth::{CredentialVerifier, Credentials};
use crate::character::{AbilityType, CharacterSheet, EntryId, InfoField, InventoryItem, Pool};
use crate::dice::{
    self, DieRoller, DieType, ExpressionRoll, Flash, Highlight, RollOutcome, RollRequest,
    ThreadDice, PURE_ROLL,
};
use crate::error::{AppError, CommandError};
use crate::history::{self, RollRecord};
use crate::inventory;
use crate::preferences::{self, Favorites, PreferenceStore, SheetTab, Theme};
use crate::session::{self, Session};
use crate::settings::Settings;
use crate::sheet::{self, AbilityDraft, ConditionDraft};
use crate::store::{DocumentStore, Snapshot, SnapshotStream};
use crate::utils::parse_int;

pub const HELP: &str = "\
login <user> <password>      sign in
logout                       sign out
list | new | select <id> | delete [id]
show                         the selected sheet
roll [N]dM [stat] [+/-mod]   roll dice (stat or \"puro\")
expr NdM [mod]               roll any dice expression
adv | dis | init             advantage, disadvantage, initiative
history [filter]             recent rolls with average/max/min
use <ability id>             pay an ability's cost
tick <condition id>          advance a condition one round
bar <pool> <value>           set hp, sanity, inata, ether or vigor
max <pool> [value]           override a maximum (blank restores the default)
stat <name> <value> | info <field> <text> | coins <gold> <silver>
level <n> | name <text> | notes <text> | image <url> | main on|off
ability add <type> <cost> <title> | ability rm <id> | abilities [type] [query]
fav <ability id>             star or unstar an ability
trait add <name> [| effect] | trait rm <id>
condition add <rounds> <damage> <name> | condition rm <id>
item add [qty] <name> [#tag..] | item rm <n> | items [#tag] [query] | tags
theme | tab [name] | help | quit";

const INFO_USAGE: &str = "info <class|race|background|alignment|age|height|weight> <text>";
const TAB_USAGE: &str = "tab attributes|abilities|inventory|status|notes|info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Login { username: String, password: String },
    Logout,
    List,
    New,
    Select(String),
    Delete(Option<String>),
    Show,
    Roll(RollRequest),
    Expression { expression: String, modifier: i64 },
    Advantage(bool),
    Initiative,
    History(String),
    UseAbility(EntryId),
    Tick(EntryId),
    SetBar { pool: Pool, value: String },
    SetMax { pool: Pool, value: String },
    SetStat { name: String, value: String },
    SetInfo { field: InfoField, text: String },
    SetCoins { gold: String, silver: String },
    SetLevel(String),
    Rename(String),
    Notes(String),
    Image(String),
    Main(bool),
    AddAbility(AbilityDraft),
    RemoveAbility(EntryId),
    Abilities { kind: Option<AbilityType>, query: String },
    Favorite(EntryId),
    AddTrait { name: String, effect: String },
    RemoveTrait(EntryId),
    AddCondition(ConditionDraft),
    RemoveCondition(EntryId),
    AddItem(InventoryItem),
    RemoveItem(usize),
    Items { tag: Option<String>, query: String },
    Tags,
    Theme,
    Tab(Option<SheetTab>),
}

fn usage(text: &'static str) -> AppError {
    CommandError::Usage(text).into()
}

fn entry_id(token: Option<&&str>, text: &'static str) -> Result<EntryId, AppError> {
    token
        .and_then(|t| t.parse::<EntryId>().ok())
        .ok_or_else(|| usage(text))
}

fn pool(token: Option<&&str>, text: &'static str) -> Result<Pool, AppError> {
    token
        .and_then(|t| Pool::from_key(t))
        .ok_or_else(|| usage(text))
}

fn known_kind(token: &str) -> Option<AbilityType> {
    match AbilityType::from(token.to_lowercase().as_str()) {
        AbilityType::Other(_) => None,
        kind => Some(kind),
    }
}

// "2d6" or "d6"; a missing count means one.
fn parse_dice_token(token: &str) -> Option<(u32, DieType)> {
    let token = token.to_lowercase();
    let expression = if token.starts_with('d') {
        format!("1{token}")
    } else {
        token
    };
    let parsed = dice::parse_dice_string(&expression)?;
    Some((parsed.count.max(1), DieType::from_name(&format!("d{}", parsed.sides))))
}

fn parse_roll(args: &[&str]) -> Result<Command, AppError> {
    let mut request = RollRequest::default();
    let mut rest = args;
    if let Some((first, tail)) = rest.split_first() {
        if let Some((count, die)) = parse_dice_token(first) {
            request.count = count;
            request.die = die;
            rest = tail;
        }
    }
    for token in rest {
        if token.starts_with(['+', '-']) || token.chars().all(|c| c.is_ascii_digit()) {
            request.manual_modifier = parse_int(token.trim_start_matches('+'));
        } else if *token == PURE_ROLL {
            request.attribute = None;
        } else {
            request.attribute = Some(token.to_string());
        }
    }
    Ok(Command::Roll(request))
}

fn parse_item(args: &[&str]) -> Result<Command, AppError> {
    let (quantity, rest) = match args.split_first() {
        Some((first, tail)) if first.chars().all(|c| c.is_ascii_digit()) => {
            (parse_int(first), tail)
        }
        _ => (1, args),
    };
    let (tags, words): (Vec<&str>, Vec<&str>) =
        rest.iter().copied().partition(|w| w.starts_with('#'));
    let name = words.join(" ");
    if name.is_empty() {
        return Err(usage("item add [qty] <name> [#tag..]"));
    }
    Ok(Command::AddItem(InventoryItem {
        name,
        quantity,
        description: String::new(),
        tags: tags
            .iter()
            .map(|t| t.trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    }))
}

impl std::str::FromStr for Command {
    type Err = AppError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = tokens.split_first() else {
            return Err(usage("type a command, or `help`"));
        };
        let text = || args.join(" ");

        let command = match name.to_lowercase().as_str() {
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "login" => match args {
                [username, password, ..] => Command::Login {
                    username: username.to_string(),
                    password: password.to_string(),
                },
                _ => return Err(usage("login <user> <password>")),
            },
            "logout" => Command::Logout,
            "list" => Command::List,
            "new" => Command::New,
            "select" => match args.first() {
                Some(id) => Command::Select(id.to_string()),
                None => return Err(usage("select <id>")),
            },
            "delete" => Command::Delete(args.first().map(|id| id.to_string())),
            "show" => Command::Show,
            "roll" => parse_roll(args)?,
            "expr" => match args {
                [expression, rest @ ..] => Command::Expression {
                    expression: expression.to_string(),
                    modifier: rest.first().map_or(0, |m| parse_int(m.trim_start_matches('+'))),
                },
                _ => return Err(usage("expr NdM [mod]")),
            },
            "adv" => Command::Advantage(true),
            "dis" => Command::Advantage(false),
            "init" => Command::Initiative,
            "history" => Command::History(text()),
            "use" => Command::UseAbility(entry_id(args.first(), "use <ability id>")?),
            "tick" => Command::Tick(entry_id(args.first(), "tick <condition id>")?),
            "bar" => Command::SetBar {
                pool: pool(args.first(), "bar <pool> <value>")?,
                value: args.get(1..).unwrap_or_default().join(" "),
            },
            "max" => Command::SetMax {
                pool: pool(args.first(), "max <pool> [value]")?,
                value: args.get(1..).unwrap_or_default().join(" "),
            },
            "stat" => match args {
                [stat, value, ..] => Command::SetStat {
                    name: stat.to_string(),
                    value: value.to_string(),
                },
                _ => return Err(usage("stat <name> <value>")),
            },
            "info" => match args.split_first() {
                Some((field, rest)) => Command::SetInfo {
                    field: field.parse().map_err(|_| usage(INFO_USAGE))?,
                    text: rest.join(" "),
                },
                None => return Err(usage("info <field> <text>")),
            },
            "coins" => match args {
                [gold, silver, ..] => Command::SetCoins {
                    gold: gold.to_string(),
                    silver: silver.to_string(),
                },
                [gold] => Command::SetCoins {
                    gold: gold.to_string(),
                    silver: "0".to_string(),
                },
                _ => return Err(usage("coins <gold> <silver>")),
            },
            "level" => Command::SetLevel(text()),
            "name" => Command::Rename(text()),
            "notes" => Command::Notes(text()),
            "image" => Command::Image(text()),
            "main" => match args.first().map(|a| a.to_lowercase()).as_deref() {
                Some("on" | "yes" | "true") => Command::Main(true),
                Some("off" | "no" | "false") => Command::Main(false),
                _ => return Err(usage("main on|off")),
            },
            "ability" => match args {
                ["add", kind, cost, title @ ..] => Command::AddAbility(AbilityDraft {
                    title: title.join(" "),
                    kind: AbilityType::from(kind.to_lowercase().as_str()),
                    cost: cost.to_string(),
                    ..Default::default()
                }),
                ["rm", id, ..] => Command::RemoveAbility(entry_id(Some(id), "ability rm <id>")?),
                _ => return Err(usage("ability add <type> <cost> <title> | ability rm <id>")),
            },
            "abilities" => match args.split_first() {
                Some((first, rest)) if known_kind(first).is_some() => Command::Abilities {
                    kind: known_kind(first),
                    query: rest.join(" "),
                },
                _ => Command::Abilities {
                    kind: None,
                    query: text(),
                },
            },
            "fav" => Command::Favorite(entry_id(args.first(), "fav <ability id>")?),
            "trait" => match args {
                ["add", rest @ ..] if !rest.is_empty() => {
                    let joined = rest.join(" ");
                    let (name, effect) = joined.split_once('|').unwrap_or((joined.as_str(), ""));
                    Command::AddTrait {
                        name: name.trim().to_string(),
                        effect: effect.trim().to_string(),
                    }
                }
                ["rm", id, ..] => Command::RemoveTrait(entry_id(Some(id), "trait rm <id>")?),
                _ => return Err(usage("trait add <name> [| effect] | trait rm <id>")),
            },
            "condition" => match args {
                ["add", rounds, damage, name @ ..] => Command::AddCondition(ConditionDraft {
                    name: name.join(" "),
                    rounds: rounds.to_string(),
                    damage: damage.to_string(),
                    ..Default::default()
                }),
                ["rm", id, ..] => {
                    Command::RemoveCondition(entry_id(Some(id), "condition rm <id>")?)
                }
                _ => {
                    return Err(usage(
                        "condition add <rounds> <damage> <name> | condition rm <id>",
                    ));
                }
            },
            "item" => match args {
                ["add", rest @ ..] => parse_item(rest)?,
                ["rm", n, ..] => match n.parse::<usize>() {
                    Ok(n) if n > 0 => Command::RemoveItem(n - 1),
                    _ => return Err(usage("item rm <n>")),
                },
                _ => return Err(usage("item add [qty] <name> [#tag..] | item rm <n>")),
            },
            "items" => {
                let tag = args
                    .first()
                    .filter(|t| t.starts_with('#'))
                    .map(|t| t.trim_start_matches('#').to_string());
                let skip = usize::from(tag.is_some());
                Command::Items {
                    tag,
                    query: args[skip..].join(" "),
                }
            }
            "tags" => Command::Tags,
            "theme" => Command::Theme,
            "tab" => match args.first() {
                Some(tab) => Command::Tab(Some(
                    tab.to_lowercase().parse().map_err(|_| usage(TAB_USAGE))?,
                )),
                None => Command::Tab(None),
            },
            other => return Err(CommandError::Unknown(other.to_string()).into()),
        };
        Ok(command)
    }
}

// What the loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Quit,
}

pub struct Shell<R: DieRoller = ThreadDice> {
    store: Arc<dyn DocumentStore>,
    prefs: Box<dyn PreferenceStore>,
    verifier: Box<dyn CredentialVerifier>,
    settings: Settings,
    dice: R,
    theme: Theme,
    session: Option<Session>,
    watch: Option<SnapshotStream>, // Characters stream opened by the last login, until taken.
}

impl<R: DieRoller> Shell<R> {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        prefs: Box<dyn PreferenceStore>,
        verifier: Box<dyn CredentialVerifier>,
        settings: Settings,
        dice: R,
    ) -> Self {
        let theme = preferences::load_theme(prefs.as_ref(), None, settings.default_theme);
        Shell {
            store,
            prefs,
            verifier,
            settings,
            dice,
            theme,
            session: None,
            watch: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    // The characters stream of a fresh login. The caller polls it and feeds `apply_snapshot`.
    pub fn take_watch(&mut self) -> Option<SnapshotStream> {
        self.watch.take()
    }

    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        if let Some(session) = &self.session {
            if snapshot.path == session.characters_path() {
                log::debug!("Applying snapshot of {} documents", snapshot.documents.len());
                self.session = Some(session.apply_snapshot(snapshot));
            }
        }
    }

    pub fn handle_line(&mut self, line: &str) -> Result<Reply, AppError> {
        let command: Command = line.parse()?;
        if command == Command::Quit {
            return Ok(Reply::Quit);
        }
        self.handle_command(command).map(Reply::Text)
    }

    fn session_ref(&self) -> Result<&Session, AppError> {
        self.session.as_ref().ok_or(AppError::NotLoggedIn)
    }

    fn session_mut(&mut self) -> Result<&mut Session, AppError> {
        self.session.as_mut().ok_or(AppError::NotLoggedIn)
    }

    fn selected_id(&self) -> Result<String, AppError> {
        self.session_ref()?
            .selected
            .clone()
            .ok_or(AppError::NoCharacterSelected)
    }

    // Apply a pure change to the working sheet and persist it.
    fn edit<F>(&mut self, change: F) -> Result<String, AppError>
    where
        F: FnOnce(&CharacterSheet) -> Result<CharacterSheet, AppError>,
    {
        let store = Arc::clone(&self.store);
        let session = self.session_mut()?;
        let updated = change(&session.sheet)?;
        session.commit(store.as_ref(), updated)?;
        Ok(format!("Saved {}.", session.sheet.name))
    }

    // History is best effort: a failed write is logged and the roll still stands.
    fn record(&self, record: RollRecord) {
        if let Some(session) = &self.session {
            let user = session.user.as_str();
            if let Err(e) = history::record_roll(self.store.as_ref(), user, &record) {
                log::error!("Error saving roll history: {e}");
            }
        }
    }

    pub fn handle_command(&mut self, command: Command) -> Result<String, AppError> {
        match command {
            Command::Help => Ok(HELP.to_string()),
            Command::Quit => Ok(String::new()),
            Command::Login { username, password } => {
                let credentials = Credentials::new(username, password);
                let session = session::login(self.verifier.as_ref(), &credentials)?;
                self.watch = Some(session.watch_characters(self.store.as_ref())?);
                self.theme = preferences::load_theme(
                    self.prefs.as_ref(),
                    Some((self.store.as_ref(), session.user.as_str())),
                    self.theme,
                );
                let greeting = format!("Welcome, {}.", session.user);
                self.session = Some(session);
                Ok(greeting)
            }
            Command::Logout => {
                self.session = None;
                self.watch = None;
                Ok("Signed out.".to_string())
            }
            Command::List => Ok(render_list(self.session_ref()?)),
            Command::New => {
                let store = Arc::clone(&self.store);
                let session = self.session_mut()?;
                let id = session.create_character(store.as_ref())?;
                Ok(format!("Created {} [{id}].", session.sheet.name))
            }
            Command::Select(id) => {
                let selected = self.session_ref()?.select(&id)?;
                let reply = render_sheet(&selected.sheet);
                self.session = Some(selected);
                Ok(reply)
            }
            Command::Delete(id) => {
                let id = match id {
                    Some(id) => id,
                    None => self.selected_id()?,
                };
                let store = Arc::clone(&self.store);
                self.session_mut()?.delete_character(store.as_ref(), &id)?;
                Ok(format!("Deleted {id}."))
            }
            Command::Show => Ok(render_sheet(&self.session_ref()?.sheet)),
            Command::Roll(request) => {
                let stats = self
                    .session
                    .as_ref()
                    .map(|s| s.sheet.stats.clone())
                    .unwrap_or_else(crate::character::Stats::empty);
                let modifier = request.modifier(&stats);
                let outcome = request.roll_with(&mut self.dice, &stats);
                self.record(RollRecord::from_request(&request, &outcome, modifier));
                Ok(render_outcome(&request.dice_string(), &outcome))
            }
            Command::Expression {
                expression,
                modifier,
            } => {
                let roll = dice::roll_dice_string_with(&mut self.dice, &expression, modifier)
                    .ok_or_else(|| usage("expr NdM [mod]"))?;
                Ok(render_expression(&roll))
            }
            Command::Advantage(is_advantage) => {
                let outcome = dice::roll_advantage_with(&mut self.dice, is_advantage);
                let record = RollRecord::advantage(&outcome, is_advantage);
                let reply = render_outcome(&record.dice_string, &outcome);
                self.record(record);
                Ok(reply)
            }
            Command::Initiative => {
                let outcome = dice::roll_initiative_with(&mut self.dice);
                let record = RollRecord::initiative(&outcome);
                let reply = render_outcome(&record.dice_string, &outcome);
                self.record(record);
                Ok(reply)
            }
            Command::History(needle) => {
                let session = self.session_ref()?;
                let records = history::recent_rolls(
                    self.store.as_ref(),
                    session.user.as_str(),
                    self.settings.history_limit,
                )?;
                Ok(render_history(&history::filter_history(&records, &needle)))
            }
            Command::UseAbility(id) => {
                let store = Arc::clone(&self.store);
                let session = self.session_mut()?;
                session.use_ability(store.as_ref(), id)?;
                Ok(render_bars(&session.sheet))
            }
            Command::Tick(id) => {
                let store = Arc::clone(&self.store);
                let session = self.session_mut()?;
                session.tick_condition(store.as_ref(), id)?;
                Ok(render_bars(&session.sheet))
            }
            Command::SetBar { pool, value } => {
                self.edit(|s| Ok(sheet::set_bar(s, pool, &value)))
            }
            Command::SetMax { pool, value } => {
                self.edit(|s| Ok(sheet::set_pool_max(s, pool, &value)?))
            }
            Command::SetStat { name, value } => {
                self.edit(|s| Ok(sheet::set_stat(s, &name, &value)))
            }
            Command::SetInfo { field, text } => {
                self.edit(|s| Ok(sheet::set_info_field(s, field, &text)))
            }
            Command::SetCoins { gold, silver } => {
                self.edit(|s| Ok(sheet::set_coins(s, &gold, &silver)))
            }
            Command::SetLevel(level) => self.edit(|s| Ok(sheet::set_level(s, &level))),
            Command::Rename(name) => self.edit(|s| Ok(sheet::set_name(s, &name))),
            Command::Notes(notes) => self.edit(|s| Ok(sheet::set_notes(s, &notes))),
            Command::Image(url) => self.edit(|s| Ok(sheet::set_image(s, &url))),
            Command::Main(is_main) => self.edit(|s| Ok(sheet::set_main(s, is_main))),
            Command::AddAbility(draft) => self.edit(|s| Ok(sheet::add_ability(s, &draft)?)),
            Command::RemoveAbility(id) => self.edit(|s| Ok(sheet::remove_ability(s, id))),
            Command::Abilities { kind, query } => {
                let session = self.session_ref()?;
                let character_id = session.selected.clone().unwrap_or_default();
                let favorites =
                    Favorites::load(self.prefs.as_ref(), session.user.as_str(), &character_id);
                let (starred, others) = preferences::arrange_abilities(
                    &session.sheet.abilities,
                    &favorites,
                    kind.as_ref(),
                    &query,
                );
                Ok(render_abilities(&starred, &others))
            }
            Command::Favorite(id) => {
                let character_id = self.selected_id()?;
                let session = self.session_ref()?;
                if session.sheet.ability(id).is_none() {
                    return Err(crate::error::ValidationError::UnknownEntry {
                        collection: "abilities",
                        id,
                    }
                    .into());
                }
                let mut favorites =
                    Favorites::load(self.prefs.as_ref(), session.user.as_str(), &character_id);
                let starred = favorites.toggle(id);
                favorites.save(self.prefs.as_mut())?;
                Ok(if starred { "Starred." } else { "Unstarred." }.to_string())
            }
            Command::AddTrait { name, effect } => {
                self.edit(|s| Ok(sheet::add_trait(s, &name, &effect)?))
            }
            Command::RemoveTrait(id) => self.edit(|s| Ok(sheet::remove_trait(s, id))),
            Command::AddCondition(draft) => self.edit(|s| Ok(sheet::add_condition(s, &draft)?)),
            Command::RemoveCondition(id) => self.edit(|s| Ok(sheet::remove_condition(s, id))),
            Command::AddItem(item) => self.edit(|s| Ok(inventory::add_item(s, &item)?)),
            Command::RemoveItem(index) => self.edit(|s| Ok(inventory::remove_item(s, index)?)),
            Command::Items { tag, query } => {
                let items = &self.session_ref()?.sheet.inventory;
                Ok(render_items(&inventory::filter_items(
                    items,
                    tag.as_deref(),
                    &query,
                )))
            }
            Command::Tags => Ok(inventory::available_tags(&self.session_ref()?.sheet.inventory)
                .join(", ")),
            Command::Theme => {
                let remote = self
                    .session
                    .as_ref()
                    .map(|s| (self.store.as_ref(), s.user.as_str()));
                self.theme = preferences::toggle_theme(self.theme, self.prefs.as_mut(), remote)?;
                Ok(format!("Theme: {}", self.theme))
            }
            Command::Tab(tab) => {
                let character_id = self.selected_id()?;
                match tab {
                    Some(tab) => {
                        preferences::set_active_tab(self.prefs.as_mut(), &character_id, tab)?;
                        Ok(format!("Tab: {tab}"))
                    }
                    None => Ok(format!(
                        "Tab: {}",
                        preferences::active_tab(self.prefs.as_ref(), &character_id)
                    )),
                }
            }
        }
    }
}

fn render_list(session: &Session) -> String {
    if session.characters.is_empty() {
        return "No characters yet. Use `new`.".to_string();
    }
    let mut out = String::new();
    for sheet in &session.characters {
        let id = sheet.id.as_deref().unwrap_or_default();
        let marker = if session.selected.as_deref() == Some(id) {
            ">"
        } else {
            " "
        };
        let main = if sheet.is_main { " (main)" } else { "" };
        let _ = writeln!(out, "{marker} [{id}] {} lvl {}{main}", sheet.name, sheet.level);
    }
    out.trim_end().to_string()
}

fn render_bars(sheet: &CharacterSheet) -> String {
    [Pool::Hp, Pool::Sanity, Pool::Inata, Pool::Ether, Pool::Vigor]
        .iter()
        .map(|pool| format!("{pool} {}/{}", sheet.bars.current(*pool), sheet.max_for(*pool)))
        .collect::<Vec<_>>()
        .join("  ")
}

fn render_sheet(sheet: &CharacterSheet) -> String {
    let mut out = String::new();
    let main = if sheet.is_main { " *main*" } else { "" };
    let _ = writeln!(out, "{} (level {}){main}", sheet.name, sheet.level);
    let _ = writeln!(out, "AC {}", sheet::compute_armor_class(&sheet.stats));
    let _ = writeln!(out, "{}", render_bars(sheet));
    let stats: Vec<String> = sheet
        .stats
        .iter()
        .map(|(name, value)| format!("{name} {value}"))
        .collect();
    let _ = writeln!(out, "Stats: {}", stats.join(", "));
    let _ = writeln!(
        out,
        "Coins: {} gold, {} silver",
        sheet.coins.gold, sheet.coins.silver
    );
    let info = &sheet.character_info;
    let _ = writeln!(
        out,
        "{} {} | {} | {}",
        info.race, info.class, info.background, info.alignment
    );
    for ability in &sheet.abilities {
        let _ = writeln!(
            out,
            "  ability [{}] {} ({}, cost {})",
            ability.id,
            ability.title,
            ability.kind.label(),
            ability.cost
        );
    }
    for entry in &sheet.traits {
        let _ = writeln!(out, "  trait [{}] {}: {}", entry.id, entry.name, entry.effect);
    }
    for condition in &sheet.effects {
        let _ = writeln!(
            out,
            "  condition [{}] {}: {} rounds, {} damage",
            condition.id, condition.name, condition.rounds, condition.damage
        );
    }
    let _ = writeln!(out, "  {} items", sheet.inventory.len());
    if !sheet.notes.is_empty() {
        let _ = writeln!(out, "Notes: {}", sheet.notes);
    }
    out.trim_end().to_string()
}

fn render_outcome(label: &str, outcome: &RollOutcome) -> String {
    let dice: Vec<String> = outcome
        .results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let mut face = if r.modifier == 0 {
                format!("{}", r.raw)
            } else {
                format!("{}{:+}={}", r.raw, r.modifier, r.total)
            };
            match r.highlight {
                Some(Highlight::Red) => face.push('!'),
                Some(Highlight::Green) => face.push('*'),
                None => {}
            }
            if outcome.highlighted == Some(i) {
                face = format!("<{face}>");
            }
            face
        })
        .collect();
    let flash = match outcome.flash {
        Some(Flash::Red) => "  CRITICAL FAILURE",
        Some(Flash::Green) => "  CRITICAL SUCCESS",
        None => "",
    };
    format!("{label}: [{}] total {}{flash}", dice.join(", "), outcome.total)
}

fn render_expression(roll: &ExpressionRoll) -> String {
    let faces: Vec<String> = roll.results.iter().map(|r| r.to_string()).collect();
    format!(
        "{} {:+}: [{}] total {}",
        roll.dice_string,
        roll.modifier,
        faces.join(", "),
        roll.total
    )
}

fn render_history(records: &[&RollRecord]) -> String {
    let Some(stats) = history::history_stats(records.iter().copied()) else {
        return "No rolls yet.".to_string();
    };
    let mut out = String::new();
    for record in records {
        let _ = writeln!(
            out,
            "{}  {}  {:?} = {}",
            record.formatted_time(),
            record.dice_string,
            record.results,
            record.total
        );
    }
    let _ = write!(
        out,
        "average {}  max {}  min {}",
        stats.average, stats.max, stats.min
    );
    out
}

fn render_abilities(
    starred: &[&crate::character::Ability],
    others: &[&crate::character::Ability],
) -> String {
    let line = |mark: &str, a: &crate::character::Ability| {
        format!("{mark} [{}] {} ({}, cost {})", a.id, a.title, a.kind.label(), a.cost)
    };
    starred
        .iter()
        .map(|a| line("*", *a))
        .chain(others.iter().map(|a| line(" ", *a)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_items(items: &[(usize, &InventoryItem)]) -> String {
    items
        .iter()
        .map(|(index, item)| {
            let tags = if item.tags.is_empty() {
                String::new()
            } else {
                format!(" #{}", item.tags.join(" #"))
            };
            format!("{}. {} x{}{tags}", index + 1, item.name, item.quantity)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
