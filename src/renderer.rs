//! Ratatui renderer: the terminal render collaborator and viewport.
//!
//! 布局：HUD（状态栏）/ 地图 / 消息栏。地图一格对应一个终端字符，
//! 所以鼠标的行列坐标可以直接换算成格子坐标。

use std::cell::RefCell;

use dungeon::{Item, ItemKind, Position, Tile};
use error::GameError;
use ratatui::{
    Terminal,
    backend::Backend,
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color as TuiColor, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Clear, Paragraph, Widget},
};

use crate::collaborators::{GridViewport, RenderCollaborator, Viewport};
use crate::input::PointerId;
use crate::world::{GameWorld, GroundItem};

/// Pointer feedback and the radial menu, drawn over the map.
#[derive(Debug, Default)]
struct Overlay {
    hold: Option<(f32, f32)>,
    tap: Option<(f32, f32)>,
    menu: Option<Vec<Item>>,
}

/// Ratatui terminal renderer implementation
pub struct TerminalRenderer<B: Backend> {
    terminal: RefCell<Terminal<B>>,
    viewport: GridViewport,
    overlay: RefCell<Overlay>,
}

impl<B: Backend> TerminalRenderer<B> {
    pub fn new(backend: B) -> anyhow::Result<Self> {
        Ok(Self {
            terminal: RefCell::new(Terminal::new(backend)?),
            viewport: GridViewport::new(1.0, 0, 0),
            overlay: RefCell::new(Overlay::default()),
        })
    }

    pub fn terminal(&self) -> std::cell::Ref<'_, Terminal<B>> {
        self.terminal.borrow()
    }

    pub fn is_menu_open(&self) -> bool {
        self.overlay.borrow().menu.is_some()
    }

    fn draw(&self, world: &GameWorld) -> anyhow::Result<()> {
        let mut terminal = self.terminal.try_borrow_mut()?;
        let overlay = self.overlay.borrow();
        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3), // HUD (状态栏)
                    Constraint::Min(10),   // Map (地图)
                    Constraint::Length(3), // Message log (消息栏)
                ])
                .split(f.area());

            f.render_widget(hud(world), chunks[0]);

            let block = Block::default()
                .title(format!(" Zone ({}, {}) ", world.zone.x, world.zone.y))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(TuiColor::Rgb(100, 100, 100)));
            let map_area = block.inner(chunks[1]);
            f.render_widget(block, chunks[1]);

            self.viewport
                .set_origin(f32::from(map_area.x), f32::from(map_area.y));
            self.viewport.set_size(
                world.grid.width().min(i32::from(map_area.width)),
                world.grid.height().min(i32::from(map_area.height)),
            );
            f.render_widget(MapWidget { world, overlay: &overlay }, map_area);

            let recent: Vec<&str> = world.messages.recent(3).collect();
            let messages = Paragraph::new(format_messages(&recent))
                .style(Style::default().fg(TuiColor::Gray))
                .block(Block::default().borders(Borders::TOP));
            f.render_widget(messages, chunks[2]);

            if let Some(items) = &overlay.menu {
                let area = menu_area(map_area, items.len());
                f.render_widget(Clear, area);
                f.render_widget(radial_menu(items), area);
            }
        })?;
        Ok(())
    }
}

impl<B: Backend> RenderCollaborator for TerminalRenderer<B> {
    fn render(&self, world: &GameWorld) {
        if let Err(err) = self.draw(world) {
            tracing::warn!(error = %err, "frame dropped");
        }
    }

    fn start_hold_feedback(&self, x: f32, y: f32) {
        self.overlay.borrow_mut().hold = Some((x, y));
    }

    fn clear_feedback(&self) {
        let mut overlay = self.overlay.borrow_mut();
        overlay.hold = None;
        overlay.tap = None;
    }

    fn show_tap_feedback(&self, x: f32, y: f32) {
        self.overlay.borrow_mut().tap = Some((x, y));
    }

    fn open_radial_menu(&self, items: &[Item]) {
        self.overlay.borrow_mut().menu = Some(items.to_vec());
    }

    fn close_radial_menu(&self) {
        self.overlay.borrow_mut().menu = None;
    }
}

impl<B: Backend> Viewport for TerminalRenderer<B> {
    fn screen_to_tile(&self, x: f32, y: f32) -> Result<Position, GameError> {
        self.viewport.screen_to_tile(x, y)
    }

    // mouse capture is enabled for the whole terminal session
    fn capture_pointer(&self, _id: PointerId) -> Result<(), GameError> {
        Ok(())
    }

    fn release_pointer(&self, _id: PointerId) -> Result<(), GameError> {
        Ok(())
    }
}

fn hud(world: &GameWorld) -> Paragraph<'static> {
    let player = &world.player;
    let hp_color = if player.hp * 3 <= player.max_hp {
        TuiColor::Red
    } else {
        TuiColor::Green
    };
    let inventory = if player.inventory.items.is_empty() {
        "empty".to_string()
    } else {
        player
            .inventory
            .items
            .iter()
            .map(|item| format!("{} x{}", item_label(item.kind), item.quantity))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let line = Line::from(format!(
        "HP {}/{}   Turn {}   Enemies {}   Pack: {}",
        player.hp,
        player.max_hp,
        world.turn,
        world.living_enemy_count(),
        inventory
    ));
    Paragraph::new(line)
        .style(Style::default().fg(hp_color))
        .block(Block::default().borders(Borders::BOTTOM))
}

fn radial_menu(items: &[Item]) -> Paragraph<'static> {
    let mut lines: Vec<Line> = items
        .iter()
        .map(|item| {
            let hint = if item.kind.is_usable() { " (1)" } else { "" };
            Line::from(format!("{} x{}{}", item_label(item.kind), item.quantity, hint))
        })
        .collect();
    if lines.is_empty() {
        lines.push(Line::from("Nothing to use"));
    }
    Paragraph::new(lines).block(Block::default().title(" Items ").borders(Borders::ALL))
}

fn menu_area(map: Rect, entries: usize) -> Rect {
    let height = (entries.max(1) as u16 + 2).min(map.height);
    let width = 24.min(map.width);
    Rect::new(
        map.x + map.width.saturating_sub(width) / 2,
        map.y + map.height.saturating_sub(height) / 2,
        width,
        height,
    )
}

fn item_label(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::HealingPotion => "Potion",
        ItemKind::Wood => "Wood",
        ItemKind::Coin => "Coin",
    }
}

fn item_glyph(kind: ItemKind) -> char {
    match kind {
        ItemKind::HealingPotion => '!',
        ItemKind::Wood => '=',
        ItemKind::Coin => '$',
    }
}

fn tile_style(tile: Tile) -> Style {
    let color = match tile {
        Tile::Floor => TuiColor::DarkGray,
        Tile::Wall => TuiColor::Gray,
        Tile::Water => TuiColor::Blue,
        Tile::Tree => TuiColor::Green,
        Tile::Sign | Tile::Statue => TuiColor::White,
        Tile::Npc => TuiColor::Cyan,
        Tile::Exit | Tile::Port => TuiColor::Magenta,
    };
    Style::default().fg(color)
}

/// 地图 Widget：地形、地面物品、敌人、玩家依次叠加
struct MapWidget<'a> {
    world: &'a GameWorld,
    overlay: &'a Overlay,
}

impl MapWidget<'_> {
    fn put(area: Rect, buf: &mut Buffer, pos: Position, glyph: char, style: Style) {
        if pos.x < 0 || pos.y < 0 {
            return;
        }
        let (Ok(dx), Ok(dy)) = (u16::try_from(pos.x), u16::try_from(pos.y)) else {
            return;
        };
        if dx >= area.width || dy >= area.height {
            return;
        }
        let x = area.x + dx;
        let y = area.y + dy;
        buf.set_string(x, y, glyph.to_string(), style);
    }

    fn highlight(area: Rect, buf: &mut Buffer, point: (f32, f32), style: Style) {
        let (x, y) = (point.0 as u16, point.1 as u16);
        if x >= area.left() && x < area.right() && y >= area.top() && y < area.bottom() {
            buf.set_style(Rect::new(x, y, 1, 1), style);
        }
    }
}

impl Widget for MapWidget<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let world = self.world;
        for pos in world.grid.positions() {
            if let Some(tile) = world.grid.get(pos) {
                Self::put(area, buf, pos, tile.glyph(), tile_style(tile));
            }
        }

        for (_, (item, pos)) in world.entities.query::<(&GroundItem, &Position)>().iter() {
            let style = Style::default().fg(TuiColor::Yellow);
            Self::put(area, buf, *pos, item_glyph(item.kind), style);
        }

        for entity in &world.enemies {
            if !world.is_enemy_active(*entity) {
                continue;
            }
            if let (Some(pos), Some(kind)) = (world.enemy_position(*entity), world.enemy_kind(*entity)) {
                Self::put(area, buf, pos, kind.glyph(), Style::default().fg(TuiColor::Red));
            }
        }

        let player_style = Style::default()
            .fg(TuiColor::Yellow)
            .add_modifier(Modifier::BOLD);
        Self::put(area, buf, world.player.position, '@', player_style);

        if let Some(point) = self.overlay.hold {
            Self::highlight(area, buf, point, Style::default().bg(TuiColor::DarkGray));
        }
        if let Some(point) = self.overlay.tap {
            Self::highlight(area, buf, point, Style::default().bg(TuiColor::Blue));
        }
    }
}

/// Helper function to format messages for display
fn format_messages(messages: &[&str]) -> String {
    if messages.is_empty() {
        "Welcome, adventurer.".to_string()
    } else {
        messages.join(" | ")
    }
}
