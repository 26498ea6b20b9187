//! Server list view state
//!
//! Owns the interaction state of the server configuration screen:
//! selection, the single expanded row and the single inline URL editor.
//! Key handling produces [`ViewAction`]s for the caller to run against the
//! registry; the view itself never touches persisted state.

use std::collections::HashMap;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::models::{ConnectionStatus, ServerId, ServerRecord, StatusEvent};
use crate::registry::{validate_url, RegistryError};

// =============================================================================
// View Mode
// =============================================================================

/// Interaction mode; at most one row is expanded or being edited
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Plain list navigation
    #[default]
    Browsing,
    /// Selected row shows its actions
    RowExpanded(ServerId),
    /// Selected row's URL is an editable text field
    InlineEditing(UrlEditor),
}

/// Text buffer for inline URL editing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEditor {
    pub server_id: ServerId,
    pub buffer: String,
    /// Cursor position in chars
    pub cursor: usize,
}

impl UrlEditor {
    pub fn new(server_id: ServerId, url: &str) -> Self {
        Self {
            server_id,
            buffer: url.to_string(),
            cursor: url.chars().count(),
        }
    }

    fn byte_index(&self, char_idx: usize) -> usize {
        self.buffer
            .char_indices()
            .nth(char_idx)
            .map(|(i, _)| i)
            .unwrap_or(self.buffer.len())
    }

    fn len(&self) -> usize {
        self.buffer.chars().count()
    }

    /// Insert character at cursor
    pub fn insert(&mut self, c: char) {
        let idx = self.byte_index(self.cursor);
        self.buffer.insert(idx, c);
        self.cursor += 1;
    }

    /// Delete character before cursor
    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let idx = self.byte_index(self.cursor);
            self.buffer.remove(idx);
        }
    }

    /// Delete character at cursor
    pub fn delete(&mut self) {
        if self.cursor < self.len() {
            let idx = self.byte_index(self.cursor);
            self.buffer.remove(idx);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        if self.cursor < self.len() {
            self.cursor += 1;
        }
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.len();
    }
}

// =============================================================================
// Actions
// =============================================================================

/// Registry work requested by the view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewAction {
    /// Make this server current for its type
    SetCurrent(ServerId),
    /// Delete this server
    Remove(ServerId),
    /// Save an edited URL
    SaveUrl { server_id: ServerId, url: String },
    /// Probe one server
    CheckOne(ServerId),
    /// Probe every listed server
    CheckAll,
    /// Open the add-server form
    Add,
    /// Leave the screen
    Quit,
}

// =============================================================================
// Selection State
// =============================================================================

/// Selection state for list views
#[derive(Debug, Clone, Default)]
pub struct ListState {
    /// Currently selected index
    pub selected: usize,
    /// Total number of items
    pub len: usize,
}

impl ListState {
    pub fn new(len: usize) -> Self {
        Self { selected: 0, len }
    }

    /// Move selection up
    pub fn up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Move selection down
    pub fn down(&mut self) {
        if self.len > 0 && self.selected < self.len - 1 {
            self.selected += 1;
        }
    }

    /// Jump to first item
    pub fn first(&mut self) {
        self.selected = 0;
    }

    /// Jump to last item
    pub fn last(&mut self) {
        if self.len > 0 {
            self.selected = self.len - 1;
        }
    }

    /// Update length, clamping the selection
    pub fn set_len(&mut self, len: usize) {
        self.len = len;
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }
}

// =============================================================================
// Server List View
// =============================================================================

/// State of the server configuration screen for one server type
#[derive(Debug, Clone, Default)]
pub struct ServerListView {
    pub server_type: String,
    pub servers: Vec<ServerRecord>,
    pub statuses: HashMap<ServerId, ConnectionStatus>,
    pub list: ListState,
    pub mode: ViewMode,
    /// Last error shown to the user, cleared on the next key press
    pub error: Option<String>,
}

impl ServerListView {
    pub fn new(server_type: impl Into<String>) -> Self {
        Self {
            server_type: server_type.into(),
            ..Default::default()
        }
    }

    /// Replace the list with a fresh registry snapshot
    pub fn set_servers(&mut self, servers: Vec<ServerRecord>) {
        self.list.set_len(servers.len());
        self.servers = servers;

        let focused = match &self.mode {
            ViewMode::Browsing => None,
            ViewMode::RowExpanded(id) => Some(id),
            ViewMode::InlineEditing(editor) => Some(&editor.server_id),
        };
        if let Some(id) = focused {
            if !self.servers.iter().any(|s| &s.server_id == id) {
                self.mode = ViewMode::Browsing;
            }
        }
    }

    pub fn apply_status(&mut self, event: &StatusEvent) {
        self.statuses.insert(event.server_id.clone(), event.status);
    }

    pub fn status_of(&self, server_id: &ServerId) -> ConnectionStatus {
        self.statuses.get(server_id).copied().unwrap_or_default()
    }

    pub fn selected_server(&self) -> Option<&ServerRecord> {
        self.servers.get(self.list.selected)
    }

    pub fn expanded(&self) -> Option<&ServerId> {
        match &self.mode {
            ViewMode::RowExpanded(id) => Some(id),
            _ => None,
        }
    }

    pub fn editor(&self) -> Option<&UrlEditor> {
        match &self.mode {
            ViewMode::InlineEditing(editor) => Some(editor),
            _ => None,
        }
    }

    /// Show a registry failure as a user-facing message
    pub fn report(&mut self, err: &RegistryError) {
        self.error = Some(error_message(err));
    }

    /// Handle a key press, returning registry work to perform
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<ViewAction> {
        self.error = None;

        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Some(ViewAction::Quit);
        }

        match self.mode.clone() {
            ViewMode::Browsing => self.handle_browsing_key(key),
            ViewMode::RowExpanded(id) => self.handle_expanded_key(key, id),
            ViewMode::InlineEditing(_) => self.handle_editing_key(key),
        }
    }

    /// Navigation shared by browsing and expanded modes; collapses any row
    fn handle_navigation(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Up | KeyCode::Char('k') => self.list.up(),
            KeyCode::Down | KeyCode::Char('j') => self.list.down(),
            KeyCode::Home | KeyCode::Char('g') => self.list.first(),
            KeyCode::End | KeyCode::Char('G') => self.list.last(),
            _ => return false,
        }
        self.mode = ViewMode::Browsing;
        true
    }

    fn handle_browsing_key(&mut self, key: KeyEvent) -> Option<ViewAction> {
        if self.handle_navigation(key.code) {
            return None;
        }

        match key.code {
            KeyCode::Enter | KeyCode::Char(' ') => {
                if let Some(server) = self.selected_server() {
                    self.mode = ViewMode::RowExpanded(server.server_id.clone());
                }
                None
            }
            KeyCode::Char('r') => Some(ViewAction::CheckAll),
            KeyCode::Char('a') => Some(ViewAction::Add),
            KeyCode::Char('q') | KeyCode::Esc => Some(ViewAction::Quit),
            _ => None,
        }
    }

    fn handle_expanded_key(&mut self, key: KeyEvent, id: ServerId) -> Option<ViewAction> {
        if self.handle_navigation(key.code) {
            return None;
        }

        match key.code {
            KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Esc => {
                self.mode = ViewMode::Browsing;
                None
            }
            KeyCode::Char('s') => {
                self.mode = ViewMode::Browsing;
                Some(ViewAction::SetCurrent(id))
            }
            KeyCode::Char('d') => {
                let is_current = self
                    .servers
                    .iter()
                    .any(|s| s.server_id == id && s.current);
                if is_current {
                    self.report(&RegistryError::CannotDeleteCurrent(id));
                    None
                } else {
                    self.mode = ViewMode::Browsing;
                    Some(ViewAction::Remove(id))
                }
            }
            KeyCode::Char('e') => {
                let url = self
                    .servers
                    .iter()
                    .find(|s| s.server_id == id)
                    .map(|s| s.server_url.clone())
                    .unwrap_or_default();
                self.mode = ViewMode::InlineEditing(UrlEditor::new(id, &url));
                None
            }
            KeyCode::Char('t') => Some(ViewAction::CheckOne(id)),
            _ => None,
        }
    }

    fn handle_editing_key(&mut self, key: KeyEvent) -> Option<ViewAction> {
        let ViewMode::InlineEditing(editor) = &mut self.mode else {
            return None;
        };

        match key.code {
            KeyCode::Esc => {
                self.mode = ViewMode::RowExpanded(editor.server_id.clone());
                None
            }
            KeyCode::Enter => {
                let server_id = editor.server_id.clone();
                let url = editor.buffer.trim().to_string();
                if let Err(e) = validate_url(&url) {
                    self.report(&e);
                    return None;
                }
                self.mode = ViewMode::RowExpanded(server_id.clone());
                Some(ViewAction::SaveUrl { server_id, url })
            }
            KeyCode::Char(c) => {
                editor.insert(c);
                None
            }
            KeyCode::Backspace => {
                editor.backspace();
                None
            }
            KeyCode::Delete => {
                editor.delete();
                None
            }
            KeyCode::Left => {
                editor.cursor_left();
                None
            }
            KeyCode::Right => {
                editor.cursor_right();
                None
            }
            KeyCode::Home => {
                editor.cursor_home();
                None
            }
            KeyCode::End => {
                editor.cursor_end();
                None
            }
            _ => None,
        }
    }
}

/// Single user-facing message for a registry failure
pub fn error_message(err: &RegistryError) -> String {
    match err {
        RegistryError::InvalidUrl { url, .. } => {
            format!("\"{}\" is not a valid server address", url)
        }
        RegistryError::NotFound(_) => "That server no longer exists".to_string(),
        RegistryError::CannotDeleteCurrent(_) => {
            "This is the active server. Activate another server before deleting it.".to_string()
        }
        RegistryError::PersistenceFailure(_) => {
            "Could not save server settings on this device".to_string()
        }
    }
}
