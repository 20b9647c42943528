//! 键盘输入映射
//!
//! 方向键 / WASD / vi 键移动，空格等待，E 交互，I 打开菜单，Esc 取消寻路。

use crossterm::event::{KeyCode as CrosstermKeyCode, KeyEvent, KeyEventKind};
use dungeon::{Direction, ItemKind};
use std::collections::HashMap;
use std::fmt;

/// Terminal-independent key identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Up,
    Down,
    Left,
    Right,
    Enter,
    Esc,
    Tab,
    Other,
}

impl From<CrosstermKeyCode> for Key {
    fn from(code: CrosstermKeyCode) -> Self {
        match code {
            CrosstermKeyCode::Char(c) => Key::Char(c.to_ascii_lowercase()),
            CrosstermKeyCode::Up => Key::Up,
            CrosstermKeyCode::Down => Key::Down,
            CrosstermKeyCode::Left => Key::Left,
            CrosstermKeyCode::Right => Key::Right,
            CrosstermKeyCode::Enter => Key::Enter,
            CrosstermKeyCode::Esc => Key::Esc,
            CrosstermKeyCode::Tab => Key::Tab,
            _ => Key::Other,
        }
    }
}

impl Key {
    /// Presses only; repeats and releases are dropped.
    pub fn from_event(event: &KeyEvent) -> Option<Key> {
        (event.kind == KeyEventKind::Press).then(|| Key::from(event.code))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(' ') => write!(f, "space"),
            Key::Char(c) => write!(f, "{c}"),
            Key::Up => write!(f, "up"),
            Key::Down => write!(f, "down"),
            Key::Left => write!(f, "left"),
            Key::Right => write!(f, "right"),
            Key::Enter => write!(f, "enter"),
            Key::Esc => write!(f, "esc"),
            Key::Tab => write!(f, "tab"),
            Key::Other => write!(f, "other"),
        }
    }
}

/// 与具体按键解耦的键盘命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Move(Direction),
    Wait,
    Interact,
    OpenMenu,
    CancelPath,
    UseItem(ItemKind),
    Save,
    Quit,
}

/// 键位配置
#[derive(Debug, Clone)]
pub struct KeyBindings {
    bindings: HashMap<Key, KeyCommand>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        let mut bindings = HashMap::new();
        for (keys, direction) in [
            ([Key::Up, Key::Char('w'), Key::Char('k')], Direction::Up),
            ([Key::Down, Key::Char('s'), Key::Char('j')], Direction::Down),
            ([Key::Left, Key::Char('a'), Key::Char('h')], Direction::Left),
            ([Key::Right, Key::Char('d'), Key::Char('l')], Direction::Right),
        ] {
            for key in keys {
                bindings.insert(key, KeyCommand::Move(direction));
            }
        }

        // 空格/句号等待，E/回车交互
        bindings.insert(Key::Char(' '), KeyCommand::Wait);
        bindings.insert(Key::Char('.'), KeyCommand::Wait);
        bindings.insert(Key::Char('e'), KeyCommand::Interact);
        bindings.insert(Key::Enter, KeyCommand::Interact);
        bindings.insert(Key::Char('i'), KeyCommand::OpenMenu);
        bindings.insert(Key::Tab, KeyCommand::OpenMenu);
        bindings.insert(Key::Esc, KeyCommand::CancelPath);
        bindings.insert(Key::Char('1'), KeyCommand::UseItem(ItemKind::HealingPotion));
        bindings.insert(Key::Char('p'), KeyCommand::Save);
        bindings.insert(Key::Char('q'), KeyCommand::Quit);
        Self { bindings }
    }
}

impl KeyBindings {
    pub fn bind(&mut self, key: Key, command: KeyCommand) {
        self.bindings.insert(key, command);
    }

    pub fn unbind(&mut self, key: Key) -> Option<KeyCommand> {
        self.bindings.remove(&key)
    }

    pub fn command_for(&self, key: Key) -> Option<KeyCommand> {
        self.bindings.get(&key).copied()
    }
}

/// Keyboard front-end of the input family.
#[derive(Debug, Clone, Default)]
pub struct KeyboardHandler {
    bindings: KeyBindings,
}

impl KeyboardHandler {
    pub fn new(bindings: KeyBindings) -> Self {
        Self { bindings }
    }

    pub fn bindings_mut(&mut self) -> &mut KeyBindings {
        &mut self.bindings
    }

    pub fn handle(&self, key: Key) -> Option<KeyCommand> {
        let command = self.bindings.command_for(key);
        if command.is_none() {
            tracing::trace!(%key, "unbound key");
        }
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    #[test]
    fn arrows_wasd_and_vi_keys_move() {
        let keyboard = KeyboardHandler::default();
        for key in [Key::Up, Key::Char('w'), Key::Char('k')] {
            assert_eq!(keyboard.handle(key), Some(KeyCommand::Move(Direction::Up)));
        }
        assert_eq!(
            keyboard.handle(Key::from(CrosstermKeyCode::Char('D'))),
            Some(KeyCommand::Move(Direction::Right))
        );
    }

    #[test]
    fn releases_are_ignored() {
        let mut event = KeyEvent::new(CrosstermKeyCode::Char('q'), KeyModifiers::NONE);
        assert_eq!(Key::from_event(&event), Some(Key::Char('q')));
        event.kind = KeyEventKind::Release;
        assert_eq!(Key::from_event(&event), None);
    }

    #[test]
    fn bindings_can_be_changed() {
        let mut keyboard = KeyboardHandler::default();
        keyboard.bindings_mut().bind(Key::Char('x'), KeyCommand::Quit);
        assert_eq!(keyboard.bindings_mut().unbind(Key::Char('q')), Some(KeyCommand::Quit));
        assert_eq!(keyboard.handle(Key::Char('x')), Some(KeyCommand::Quit));
        assert_eq!(keyboard.handle(Key::Char('q')), None);
        assert_eq!(keyboard.handle(Key::Other), None);
    }

    #[test]
    fn keys_have_readable_labels() {
        assert_eq!(Key::Char(' ').to_string(), "space");
        assert_eq!(Key::Esc.to_string(), "esc");
    }
}
