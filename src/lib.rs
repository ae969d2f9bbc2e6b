pub mod client;
pub mod errors;
pub mod keyboard;
pub mod layout;
pub mod monitor;
pub mod size_hints;
pub mod spawn;
pub mod wm;

use x11rb::protocol::xproto::ModMask;

use crate::client::TagMask;
use crate::keyboard::keysyms::{self, Keysym};
use crate::keyboard::{Action, Arg, KeyBinding};

/// Where a button press landed; bindings are matched against this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickRegion {
    TagBar,
    StatusText,
    WinTitle,
    ClientWin,
    RootWin,
}

#[derive(Debug, Clone, Copy)]
pub struct ButtonBinding {
    pub click: ClickRegion,
    pub mods: u16,
    pub button: u8,
    pub action: Action,
    pub arg: Arg,
}

/// Initial placement rule, matched by substring against WM_CLASS and the
/// window title the way `xprop` reports them.
#[derive(Debug, Clone, Copy)]
pub struct WindowRule {
    pub class: Option<&'static str>,
    pub instance: Option<&'static str>,
    pub title: Option<&'static str>,
    pub tags: TagMask,
    pub is_floating: bool,
    pub monitor: Option<usize>,
}

impl WindowRule {
    pub fn matches(&self, class: &str, instance: &str, title: &str) -> bool {
        self.class.is_none_or(|c| class.contains(c))
            && self.instance.is_none_or(|i| instance.contains(i))
            && self.title.is_none_or(|t| title.contains(t))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Appearance
    pub border_width: i32,
    pub border_focused: u32,
    pub border_unfocused: u32,
    pub gappx: i32,

    /// Pixels a dragged edge snaps to the work-area border from, and the
    /// drag distance that promotes a tiled client to floating.
    pub snap: i32,

    // Tiling
    pub mfact: f32,
    pub nmaster: i32,
    /// Respect ICCCM size hints for tiled clients too, not just floating
    /// ones.
    pub resize_hints: bool,

    // Tags
    pub tags: &'static [&'static str],

    // External status bar
    pub alt_bar_class: &'static str,
    pub alt_tray_instance: &'static str,
    /// Nominal width of one tag label cell on the external bar, used to map
    /// bar clicks onto tags.
    pub bar_tag_cell_width: i32,
    /// Nominal width of the status text block at the bar's right edge.
    pub bar_status_width: i32,

    pub rules: Vec<WindowRule>,
    pub keys: Vec<KeyBinding>,
    pub buttons: Vec<ButtonBinding>,
}

impl Config {
    /// Bitmask covering every configured tag.
    pub fn all_tags(&self) -> TagMask {
        (1 << self.tags.len()) - 1
    }
}

/// The view/toggle-view/tag/toggle-tag quartet every tag key carries.
fn tag_keys(modkey: u16, keysym: Keysym, tag: usize) -> [KeyBinding; 4] {
    let shift = u16::from(ModMask::SHIFT);
    let control = u16::from(ModMask::CONTROL);
    let mask = Arg::Mask(1 << tag);
    [
        KeyBinding::new(modkey, keysym, Action::ComboView, mask),
        KeyBinding::new(modkey | control, keysym, Action::ToggleView, mask),
        KeyBinding::new(modkey | shift, keysym, Action::ComboTag, mask),
        KeyBinding::new(modkey | control | shift, keysym, Action::ToggleTag, mask),
    ]
}

const RUNNER_CMD: &[&str] = &["rofi", "-show", "run"];
const TERM_CMD: &[&str] = &["alacritty"];
const BROWSER_CMD: &[&str] = &["firefox"];
const LOCK_CMD: &[&str] = &["betterlockscreen", "-l"];

impl Default for Config {
    fn default() -> Self {
        let modkey = u16::from(ModMask::M4);
        let shift = u16::from(ModMask::SHIFT);

        let mut keys = vec![
            KeyBinding::new(modkey, keysyms::XK_D, Action::Spawn, Arg::Cmd(RUNNER_CMD)),
            KeyBinding::new(modkey, keysyms::XK_RETURN, Action::Spawn, Arg::Cmd(TERM_CMD)),
            KeyBinding::new(modkey, keysyms::XK_B, Action::Spawn, Arg::Cmd(BROWSER_CMD)),
            KeyBinding::new(modkey | shift, keysyms::XK_P, Action::Spawn, Arg::Cmd(LOCK_CMD)),
            KeyBinding::new(modkey, keysyms::XK_J, Action::FocusStack, Arg::Int(1)),
            KeyBinding::new(modkey, keysyms::XK_K, Action::FocusStack, Arg::Int(-1)),
            KeyBinding::new(modkey, keysyms::XK_U, Action::IncNMaster, Arg::Int(1)),
            KeyBinding::new(modkey, keysyms::XK_I, Action::IncNMaster, Arg::Int(-1)),
            KeyBinding::new(modkey, keysyms::XK_Y, Action::SetMFact, Arg::Float(-0.05)),
            KeyBinding::new(modkey, keysyms::XK_O, Action::SetMFact, Arg::Float(0.05)),
            KeyBinding::new(modkey, keysyms::XK_F, Action::Zoom, Arg::None),
            KeyBinding::new(modkey | shift, keysyms::XK_F, Action::ToggleFullscreen, Arg::None),
            KeyBinding::new(modkey | shift, keysyms::XK_Q, Action::KillClient, Arg::None),
            KeyBinding::new(modkey | shift, keysyms::XK_SPACE, Action::ToggleFloating, Arg::None),
            KeyBinding::new(modkey, keysyms::XK_0, Action::ComboView, Arg::Mask(!0)),
            KeyBinding::new(modkey | shift, keysyms::XK_0, Action::ComboTag, Arg::Mask(!0)),
            KeyBinding::new(modkey, keysyms::XK_L, Action::FocusMon, Arg::Int(-1)),
            KeyBinding::new(modkey, keysyms::XK_H, Action::FocusMon, Arg::Int(1)),
            KeyBinding::new(modkey | shift, keysyms::XK_L, Action::TagMon, Arg::Int(-1)),
            KeyBinding::new(modkey | shift, keysyms::XK_H, Action::TagMon, Arg::Int(1)),
            KeyBinding::new(modkey | shift, keysyms::XK_E, Action::Quit, Arg::None),
        ];

        let tag_syms = [
            keysyms::XK_1,
            keysyms::XK_2,
            keysyms::XK_3,
            keysyms::XK_4,
            keysyms::XK_5,
            keysyms::XK_6,
            keysyms::XK_7,
            keysyms::XK_8,
            keysyms::XK_9,
        ];
        for (tag, &keysym) in tag_syms.iter().enumerate() {
            keys.extend(tag_keys(modkey, keysym, tag));
        }

        let buttons = vec![
            ButtonBinding {
                click: ClickRegion::ClientWin,
                mods: modkey,
                button: 1,
                action: Action::MoveMouse,
                arg: Arg::None,
            },
            ButtonBinding {
                click: ClickRegion::ClientWin,
                mods: modkey,
                button: 2,
                action: Action::ToggleFloating,
                arg: Arg::None,
            },
            ButtonBinding {
                click: ClickRegion::ClientWin,
                mods: modkey,
                button: 3,
                action: Action::ResizeMouse,
                arg: Arg::None,
            },
            ButtonBinding {
                click: ClickRegion::TagBar,
                mods: 0,
                button: 1,
                action: Action::View,
                arg: Arg::None,
            },
        ];

        Self {
            border_width: 1,
            border_focused: 0x005577,
            border_unfocused: 0x444444,
            gappx: 10,
            snap: 32,
            mfact: 0.55,
            nmaster: 1,
            resize_hints: true,
            tags: &["1", "2", "3", "4", "5", "6", "7", "8", "9"],
            alt_bar_class: "Polybar",
            alt_tray_instance: "tray",
            bar_tag_cell_width: 30,
            bar_status_width: 0,
            rules: vec![
                WindowRule {
                    class: Some("Gimp"),
                    instance: None,
                    title: None,
                    tags: 0,
                    is_floating: true,
                    monitor: None,
                },
                WindowRule {
                    class: Some("Firefox"),
                    instance: None,
                    title: None,
                    tags: 1 << 8,
                    is_floating: false,
                    monitor: None,
                },
            ],
            keys,
            buttons,
        }
    }
}
