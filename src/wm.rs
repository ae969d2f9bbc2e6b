//! The window-management state machine: event dispatch, the client and
//! monitor registries, focus and stacking policy, tiling, and the modal
//! mouse loops.

use std::collections::{HashMap, VecDeque};

use log::{debug, error, info};
use x11rb::connection::Connection;
use x11rb::cursor::Handle as CursorHandle;
use x11rb::errors::ReplyError;
use x11rb::protocol::xproto::*;
use x11rb::protocol::{ErrorKind, Event};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::x11_utils::X11Error;

use crate::client::{self, Client, TagMask};
use crate::errors::{WmError, WmResult};
use crate::keyboard::{self, Action, Arg, KeyboardMapping};
use crate::layout::{self, TileParams};
use crate::monitor::{self, Monitor, Rect};
use crate::spawn;
use crate::{ButtonBinding, ClickRegion, Config};

const WITHDRAWN_STATE: u32 = 0;
const NORMAL_STATE: u32 = 1;
const ICONIC_STATE: u32 = 3;

const URGENCY_HINT: u32 = 1 << 8;
const INPUT_HINT: u32 = 1 << 0;

/// Motion events inside the modal loops are throttled to roughly 60 Hz.
const MOTION_INTERVAL_MS: u32 = 1000 / 60;

const TITLE_MAX_BYTES: usize = 256;
const BROKEN_TITLE: &str = "broken";

struct AtomCache {
    wm_protocols: Atom,
    wm_delete_window: Atom,
    wm_state: Atom,
    wm_take_focus: Atom,
    wm_name: Atom,
    net_supported: Atom,
    net_supporting_wm_check: Atom,
    net_wm_name: Atom,
    net_wm_state: Atom,
    net_wm_state_fullscreen: Atom,
    net_wm_window_type: Atom,
    net_wm_window_type_dialog: Atom,
    net_active_window: Atom,
    net_client_list: Atom,
    utf8_string: Atom,
}

impl AtomCache {
    fn new(connection: &RustConnection) -> WmResult<Self> {
        let intern = |name: &[u8]| -> WmResult<Atom> {
            Ok(connection.intern_atom(false, name)?.reply()?.atom)
        };

        Ok(Self {
            wm_protocols: intern(b"WM_PROTOCOLS")?,
            wm_delete_window: intern(b"WM_DELETE_WINDOW")?,
            wm_state: intern(b"WM_STATE")?,
            wm_take_focus: intern(b"WM_TAKE_FOCUS")?,
            wm_name: AtomEnum::WM_NAME.into(),
            net_supported: intern(b"_NET_SUPPORTED")?,
            net_supporting_wm_check: intern(b"_NET_SUPPORTING_WM_CHECK")?,
            net_wm_name: intern(b"_NET_WM_NAME")?,
            net_wm_state: intern(b"_NET_WM_STATE")?,
            net_wm_state_fullscreen: intern(b"_NET_WM_STATE_FULLSCREEN")?,
            net_wm_window_type: intern(b"_NET_WM_WINDOW_TYPE")?,
            net_wm_window_type_dialog: intern(b"_NET_WM_WINDOW_TYPE_DIALOG")?,
            net_active_window: intern(b"_NET_ACTIVE_WINDOW")?,
            net_client_list: intern(b"_NET_CLIENT_LIST")?,
            utf8_string: intern(b"UTF8_STRING")?,
        })
    }

    fn supported(&self) -> [Atom; 9] {
        [
            self.net_supported,
            self.net_supporting_wm_check,
            self.net_wm_name,
            self.net_wm_state,
            self.net_wm_state_fullscreen,
            self.net_wm_window_type,
            self.net_wm_window_type_dialog,
            self.net_active_window,
            self.net_client_list,
        ]
    }
}

struct Cursors {
    normal: Cursor,
    resize: Cursor,
    moving: Cursor,
}

pub struct WindowManager {
    config: Config,
    connection: RustConnection,
    screen_number: usize,
    root: Window,
    check_window: Window,
    screen_width: i32,
    screen_height: i32,
    /// Managed windows in manage order; membership test for event routing.
    windows: Vec<Window>,
    clients: HashMap<Window, Client>,
    monitors: Vec<Monitor>,
    selected_monitor: usize,
    /// Last monitor the root pointer was seen on.
    motion_monitor: Option<usize>,
    atoms: AtomCache,
    cursors: Cursors,
    keyboard: KeyboardMapping,
    numlock: u16,
    /// Multi-key tag composition is active until the next key or button
    /// release.
    combo: bool,
    running: bool,
    /// Events put aside by the modal loops and the EnterNotify drain,
    /// processed before blocking on the connection again.
    pending: VecDeque<Event>,
}

impl WindowManager {
    pub fn new(config: Config) -> WmResult<Self> {
        let (connection, screen_number) = x11rb::connect(None)?;
        let setup_screen = connection.setup().roots[screen_number].clone();
        let root = setup_screen.root;

        Self::become_wm(&connection, root)?;
        spawn::install_sigchld_handler();

        let atoms = AtomCache::new(&connection)?;

        let resource_db = x11rb::resource_manager::new_from_default(&connection)?;
        let cursor_handle = CursorHandle::new(&connection, screen_number, &resource_db)?.reply()?;
        let cursors = Cursors {
            normal: cursor_handle.load_cursor(&connection, "left_ptr")?,
            resize: cursor_handle.load_cursor(&connection, "sizing")?,
            moving: cursor_handle.load_cursor(&connection, "fleur")?,
        };

        let mapping = KeyboardMapping::refresh(&connection)?;
        let numlock = keyboard::numlock_mask(&connection, &mapping)?;

        let mut manager = Self {
            config,
            connection,
            screen_number,
            root,
            check_window: x11rb::NONE,
            screen_width: setup_screen.width_in_pixels as i32,
            screen_height: setup_screen.height_in_pixels as i32,
            windows: Vec::new(),
            clients: HashMap::new(),
            monitors: Vec::new(),
            selected_monitor: 0,
            motion_monitor: None,
            atoms,
            cursors,
            keyboard: mapping,
            numlock,
            combo: false,
            running: true,
            pending: VecDeque::new(),
        };

        manager.update_geometry()?;
        manager.setup()?;
        Ok(manager)
    }

    /// Selecting substructure-redirect succeeds for exactly one client per
    /// root window.
    fn become_wm(connection: &RustConnection, root: Window) -> WmResult<()> {
        let redirect =
            ChangeWindowAttributesAux::new().event_mask(EventMask::SUBSTRUCTURE_REDIRECT);
        match connection.change_window_attributes(root, &redirect)?.check() {
            Ok(()) => Ok(()),
            Err(ReplyError::X11Error(ref e)) if e.error_kind == ErrorKind::Access => {
                Err(WmError::OtherWmRunning)
            }
            Err(other) => Err(other.into()),
        }
    }

    fn setup(&mut self) -> WmResult<()> {
        let check_window = self.connection.generate_id()?;
        self.connection.create_window(
            x11rb::COPY_DEPTH_FROM_PARENT,
            check_window,
            self.root,
            0,
            0,
            1,
            1,
            0,
            WindowClass::INPUT_OUTPUT,
            0,
            &CreateWindowAux::new(),
        )?;
        self.connection.change_property32(
            PropMode::REPLACE,
            check_window,
            self.atoms.net_supporting_wm_check,
            AtomEnum::WINDOW,
            &[check_window],
        )?;
        self.connection.change_property8(
            PropMode::REPLACE,
            check_window,
            self.atoms.net_wm_name,
            self.atoms.utf8_string,
            env!("CARGO_PKG_NAME").as_bytes(),
        )?;
        self.connection.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms.net_supporting_wm_check,
            AtomEnum::WINDOW,
            &[check_window],
        )?;
        self.connection.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms.net_supported,
            AtomEnum::ATOM,
            &self.atoms.supported(),
        )?;
        self.connection
            .delete_property(self.root, self.atoms.net_client_list)?;
        self.check_window = check_window;

        let attributes = ChangeWindowAttributesAux::new()
            .cursor(self.cursors.normal)
            .event_mask(
                EventMask::SUBSTRUCTURE_REDIRECT
                    | EventMask::SUBSTRUCTURE_NOTIFY
                    | EventMask::BUTTON_PRESS
                    | EventMask::POINTER_MOTION
                    | EventMask::ENTER_WINDOW
                    | EventMask::LEAVE_WINDOW
                    | EventMask::STRUCTURE_NOTIFY
                    | EventMask::PROPERTY_CHANGE,
            );
        self.connection
            .change_window_attributes(self.root, &attributes)?
            .check()?;

        self.grab_keys()?;
        self.focus(None)?;
        self.connection.flush()?;
        Ok(())
    }

    fn grab_keys(&mut self) -> WmResult<()> {
        self.numlock = keyboard::numlock_mask(&self.connection, &self.keyboard)?;
        keyboard::grab_keys(
            &self.connection,
            self.root,
            &self.config.keys,
            self.numlock,
            &self.keyboard,
        )
    }

    /// Adopt windows that were already mapped when we started. Non-transient
    /// windows first so transients can inherit monitor and tags from their
    /// parent.
    pub fn scan(&mut self) -> WmResult<()> {
        let tree = self.connection.query_tree(self.root)?.reply()?;

        for &window in &tree.children {
            let Ok(attributes) = self.connection.get_window_attributes(window)?.reply() else {
                continue;
            };
            if attributes.override_redirect || self.transient_for(window).is_some() {
                continue;
            }
            if !self.config.alt_tray_instance.is_empty()
                && self.wm_class_contains(
                    window,
                    self.config.alt_bar_class,
                    self.config.alt_tray_instance,
                )?
            {
                self.manage_tray(window)?;
            } else if self.wm_class_contains(window, self.config.alt_bar_class, "")? {
                self.manage_alt_bar(window)?;
            } else if attributes.map_state == MapState::VIEWABLE
                || self.window_state(window)? == Some(ICONIC_STATE)
            {
                self.manage(window)?;
            }
        }

        for &window in &tree.children {
            let Ok(attributes) = self.connection.get_window_attributes(window)?.reply() else {
                continue;
            };
            if self.transient_for(window).is_some()
                && (attributes.map_state == MapState::VIEWABLE
                    || self.window_state(window)? == Some(ICONIC_STATE))
            {
                self.manage(window)?;
            }
        }

        Ok(())
    }

    pub fn run(&mut self) -> WmResult<()> {
        info!(
            "{} running on screen {}",
            env!("CARGO_PKG_NAME"),
            self.screen_number
        );
        while self.running {
            self.connection.flush()?;
            let event = match self.pending.pop_front() {
                Some(event) => event,
                None => self.connection.wait_for_event()?,
            };
            self.handle_event(event)?;
        }
        Ok(())
    }

    fn handle_event(&mut self, event: Event) -> WmResult<()> {
        match event {
            Event::ButtonPress(event) => self.button_press(event)?,
            Event::ButtonRelease(_) | Event::KeyRelease(_) => self.combo = false,
            Event::ClientMessage(event) => self.client_message(event)?,
            Event::ConfigureRequest(event) => self.configure_request(event)?,
            Event::ConfigureNotify(event) => self.configure_notify(event)?,
            Event::DestroyNotify(event) => self.destroy_notify(event)?,
            Event::EnterNotify(event) => self.enter_notify(event)?,
            Event::FocusIn(event) => self.focus_in(event)?,
            Event::KeyPress(event) => self.key_press(event)?,
            Event::MappingNotify(event) => self.mapping_notify(event)?,
            Event::MapRequest(event) => self.map_request(event)?,
            Event::MotionNotify(event) => self.motion_notify(event)?,
            Event::PropertyNotify(event) => self.property_notify(event)?,
            Event::UnmapNotify(event) => self.unmap_notify(event)?,
            Event::Error(error) => self.handle_x_error(error)?,
            _ => {}
        }
        Ok(())
    }

    /// Xlib's error-handler trio becomes a filter over error events: the
    /// races against dying windows are dropped, everything else is fatal.
    fn handle_x_error(&mut self, error: X11Error) -> WmResult<()> {
        let ignorable = matches!(error.error_kind, ErrorKind::Window | ErrorKind::Drawable)
            || (error.error_kind == ErrorKind::Match
                && matches!(
                    error.major_opcode,
                    SET_INPUT_FOCUS_REQUEST | CONFIGURE_WINDOW_REQUEST
                ))
            || (error.error_kind == ErrorKind::Access
                && matches!(error.major_opcode, GRAB_BUTTON_REQUEST | GRAB_KEY_REQUEST));

        if ignorable {
            debug!(
                "ignoring X error {:?} for request {}",
                error.error_kind, error.major_opcode
            );
            return Ok(());
        }

        error!(
            "fatal X error {:?} for request {} (resource {:#x})",
            error.error_kind, error.major_opcode, error.bad_value
        );
        Err(WmError::Protocol(format!(
            "request code {}, error {:?}",
            error.major_opcode, error.error_kind
        )))
    }

    fn button_press(&mut self, event: ButtonPressEvent) -> WmResult<()> {
        let mut click = ClickRegion::RootWin;
        let mut tag_cell_mask: Option<TagMask> = None;

        let monitor = self.window_to_monitor(event.event)?;
        if monitor != self.selected_monitor {
            let selected = self.monitors[self.selected_monitor].sel;
            self.unfocus(selected, true)?;
            self.selected_monitor = monitor;
            self.focus(None)?;
        }

        if Some(event.event) == self.monitors[self.selected_monitor].bar_window {
            let cell = self.config.bar_tag_cell_width.max(1);
            let index = (event.event_x as i32 / cell) as usize;
            let monitor_width = self.monitors[self.selected_monitor].ww;
            if index < self.config.tags.len() {
                click = ClickRegion::TagBar;
                tag_cell_mask = Some(1 << index);
            } else if event.event_x as i32 > monitor_width - self.config.bar_status_width {
                click = ClickRegion::StatusText;
            } else {
                click = ClickRegion::WinTitle;
            }
        } else if self.clients.contains_key(&event.event) {
            self.focus(Some(event.event))?;
            self.restack(self.selected_monitor)?;
            self.connection
                .allow_events(Allow::REPLAY_POINTER, event.time)?;
            click = ClickRegion::ClientWin;
        }

        let state = keyboard::clean_mask(u16::from(event.state), self.numlock);
        let matched: Option<ButtonBinding> = self
            .config
            .buttons
            .iter()
            .copied()
            .find(|binding| {
                binding.click == click
                    && binding.button == event.detail
                    && keyboard::clean_mask(binding.mods, self.numlock) == state
            });

        if let Some(binding) = matched {
            let arg = match (binding.click, binding.arg, tag_cell_mask) {
                (ClickRegion::TagBar, Arg::None, Some(mask)) => Arg::Mask(mask),
                _ => binding.arg,
            };
            self.run_action(binding.action, arg)?;
        }
        Ok(())
    }

    fn key_press(&mut self, event: KeyPressEvent) -> WmResult<()> {
        let keysym = self.keyboard.keycode_to_keysym(event.detail);
        let state = keyboard::clean_mask(u16::from(event.state), self.numlock);
        let matched = self
            .config
            .keys
            .iter()
            .find(|key| {
                key.keysym == keysym && keyboard::clean_mask(key.mods, self.numlock) == state
            })
            .map(|key| (key.action, key.arg));

        if let Some((action, arg)) = matched {
            self.run_action(action, arg)?;
        }
        Ok(())
    }

    fn run_action(&mut self, action: Action, arg: Arg) -> WmResult<()> {
        match action {
            Action::Spawn => {
                if let Arg::Cmd(command) = arg {
                    spawn::spawn(command);
                }
            }
            Action::FocusStack => {
                if let Arg::Int(direction) = arg {
                    self.focus_stack(direction)?;
                }
            }
            Action::IncNMaster => {
                if let Arg::Int(delta) = arg {
                    self.inc_nmaster(delta)?;
                }
            }
            Action::SetMFact => {
                if let Arg::Float(delta) = arg {
                    self.set_mfact(delta)?;
                }
            }
            Action::Zoom => self.zoom()?,
            Action::ToggleFullscreen => {
                if let Some(selected) = self.monitors[self.selected_monitor].sel {
                    let fullscreen = self
                        .clients
                        .get(&selected)
                        .is_some_and(|c| c.is_fullscreen);
                    self.set_fullscreen(selected, !fullscreen)?;
                }
            }
            Action::KillClient => self.kill_client()?,
            Action::ToggleFloating => self.toggle_floating()?,
            Action::View => {
                if let Arg::Mask(mask) = arg {
                    self.view(mask)?;
                }
            }
            Action::ComboView => {
                if let Arg::Mask(mask) = arg {
                    self.combo_view(mask)?;
                }
            }
            Action::ToggleView => {
                if let Arg::Mask(mask) = arg {
                    self.toggle_view(mask)?;
                }
            }
            Action::ComboTag => {
                if let Arg::Mask(mask) = arg {
                    self.combo_tag(mask)?;
                }
            }
            Action::ToggleTag => {
                if let Arg::Mask(mask) = arg {
                    self.toggle_tag(mask)?;
                }
            }
            Action::FocusMon => {
                if let Arg::Int(direction) = arg {
                    self.focus_monitor(direction)?;
                }
            }
            Action::TagMon => {
                if let Arg::Int(direction) = arg {
                    self.tag_monitor(direction)?;
                }
            }
            Action::MoveMouse => self.move_mouse()?,
            Action::ResizeMouse => self.resize_mouse()?,
            Action::Quit => self.quit(),
        }
        Ok(())
    }

    fn client_message(&mut self, event: ClientMessageEvent) -> WmResult<()> {
        if !self.clients.contains_key(&event.window) {
            return Ok(());
        }

        if event.type_ == self.atoms.net_wm_state {
            let data = event.data.as_data32();
            if data[1] == self.atoms.net_wm_state_fullscreen
                || data[2] == self.atoms.net_wm_state_fullscreen
            {
                let currently = self.clients[&event.window].is_fullscreen;
                let fullscreen = data[0] == 1 || (data[0] == 2 && !currently);
                self.set_fullscreen(event.window, fullscreen)?;
            }
        } else if event.type_ == self.atoms.net_active_window {
            let selected = self.monitors[self.selected_monitor].sel;
            if Some(event.window) != selected && !self.clients[&event.window].is_urgent {
                self.set_urgent(event.window, true)?;
            }
        }
        Ok(())
    }

    fn configure_request(&mut self, event: ConfigureRequestEvent) -> WmResult<()> {
        let window = event.window;
        if self.clients.contains_key(&window) {
            if event.value_mask.contains(ConfigWindow::BORDER_WIDTH) {
                if let Some(client) = self.clients.get_mut(&window) {
                    client.border_width = event.border_width as i32;
                }
            } else if self.clients[&window].is_floating {
                let monitor_index = self.clients[&window].monitor_index;
                let (mx, my, mw, mh) = {
                    let m = &self.monitors[monitor_index];
                    (m.mx, m.my, m.mw, m.mh)
                };

                let Some(c) = self.clients.get_mut(&window) else {
                    return Ok(());
                };
                if event.value_mask.contains(ConfigWindow::X) {
                    c.old_x = c.x;
                    c.x = mx + event.x as i32;
                }
                if event.value_mask.contains(ConfigWindow::Y) {
                    c.old_y = c.y;
                    c.y = my + event.y as i32;
                }
                if event.value_mask.contains(ConfigWindow::WIDTH) {
                    c.old_w = c.w;
                    c.w = event.width as i32;
                }
                if event.value_mask.contains(ConfigWindow::HEIGHT) {
                    c.old_h = c.h;
                    c.h = event.height as i32;
                }
                // pull back floating windows that would leave the monitor
                if c.x + c.w > mx + mw {
                    c.x = mx + (mw / 2 - c.width_with_border() / 2);
                }
                if c.y + c.h > my + mh {
                    c.y = my + (mh / 2 - c.height_with_border() / 2);
                }

                let moved = event.value_mask.contains(ConfigWindow::X)
                    || event.value_mask.contains(ConfigWindow::Y);
                let resized = event.value_mask.contains(ConfigWindow::WIDTH)
                    || event.value_mask.contains(ConfigWindow::HEIGHT);
                let (x, y, w, h) = (c.x, c.y, c.w, c.h);

                if moved && !resized {
                    self.send_configure_notify(window)?;
                }
                if self.is_visible(window) {
                    self.connection.configure_window(
                        window,
                        &ConfigureWindowAux::new()
                            .x(x)
                            .y(y)
                            .width(w as u32)
                            .height(h as u32),
                    )?;
                }
            } else {
                // the layout owns tiled geometry; acknowledge and move on
                self.send_configure_notify(window)?;
            }
        } else {
            let mut aux = ConfigureWindowAux::new();
            if event.value_mask.contains(ConfigWindow::X) {
                aux = aux.x(event.x as i32);
            }
            if event.value_mask.contains(ConfigWindow::Y) {
                aux = aux.y(event.y as i32);
            }
            if event.value_mask.contains(ConfigWindow::WIDTH) {
                aux = aux.width(event.width as u32);
            }
            if event.value_mask.contains(ConfigWindow::HEIGHT) {
                aux = aux.height(event.height as u32);
            }
            if event.value_mask.contains(ConfigWindow::BORDER_WIDTH) {
                aux = aux.border_width(event.border_width as u32);
            }
            if event.value_mask.contains(ConfigWindow::SIBLING) {
                aux = aux.sibling(event.sibling);
            }
            if event.value_mask.contains(ConfigWindow::STACK_MODE) {
                aux = aux.stack_mode(event.stack_mode);
            }
            self.connection.configure_window(window, &aux)?;
        }
        self.sync()?;
        Ok(())
    }

    fn configure_notify(&mut self, event: ConfigureNotifyEvent) -> WmResult<()> {
        if event.window != self.root {
            return Ok(());
        }

        let dirty =
            self.screen_width != event.width as i32 || self.screen_height != event.height as i32;
        self.screen_width = event.width as i32;
        self.screen_height = event.height as i32;

        if self.update_geometry()? || dirty {
            for index in 0..self.monitors.len() {
                let screen_rect = self.monitors[index].screen_rect();
                let fullscreen: Vec<Window> = self
                    .clients
                    .values()
                    .filter(|c| c.monitor_index == index && c.is_fullscreen)
                    .map(|c| c.window)
                    .collect();
                for window in fullscreen {
                    self.resize_client(
                        window,
                        screen_rect.x,
                        screen_rect.y,
                        screen_rect.w,
                        screen_rect.h,
                    )?;
                }

                let (bar, wx, by, ww, bh) = {
                    let m = &self.monitors[index];
                    (m.bar_window, m.wx, m.by, m.ww, m.bh)
                };
                if let Some(bar) = bar {
                    self.connection.configure_window(
                        bar,
                        &ConfigureWindowAux::new()
                            .x(wx)
                            .y(by)
                            .width(ww as u32)
                            .height(bh as u32),
                    )?;
                }
            }
            self.focus(None)?;
            self.arrange(None)?;
        }
        Ok(())
    }

    fn destroy_notify(&mut self, event: DestroyNotifyEvent) -> WmResult<()> {
        if self.clients.contains_key(&event.window) {
            self.unmanage(event.window, true)?;
        } else if self
            .monitors
            .iter()
            .any(|m| m.bar_window == Some(event.window))
        {
            self.unmanage_alt_bar(event.window)?;
        } else if self
            .monitors
            .iter()
            .any(|m| m.tray_window == Some(event.window))
        {
            self.unmanage_tray(event.window)?;
        }
        Ok(())
    }

    fn enter_notify(&mut self, event: EnterNotifyEvent) -> WmResult<()> {
        if (event.mode != NotifyMode::NORMAL || event.detail == NotifyDetail::INFERIOR)
            && event.event != self.root
        {
            return Ok(());
        }

        let client = self.clients.get(&event.event).map(|c| c.window);
        let monitor = match self.clients.get(&event.event) {
            Some(c) => c.monitor_index,
            None => self.window_to_monitor(event.event)?,
        };

        if monitor != self.selected_monitor {
            let selected = self.monitors[self.selected_monitor].sel;
            self.unfocus(selected, true)?;
            self.selected_monitor = monitor;
        } else if client.is_none() || client == self.monitors[self.selected_monitor].sel {
            return Ok(());
        }

        self.focus(client)?;
        Ok(())
    }

    /// Some clients try to grab focus behind our back; give it back to the
    /// selection.
    fn focus_in(&mut self, event: FocusInEvent) -> WmResult<()> {
        if let Some(selected) = self.monitors[self.selected_monitor].sel
            && event.event != selected
        {
            self.set_focus(selected)?;
        }
        Ok(())
    }

    fn mapping_notify(&mut self, event: MappingNotifyEvent) -> WmResult<()> {
        if event.request == Mapping::KEYBOARD {
            self.keyboard = KeyboardMapping::refresh(&self.connection)?;
            self.grab_keys()?;
        }
        Ok(())
    }

    fn map_request(&mut self, event: MapRequestEvent) -> WmResult<()> {
        let Ok(attributes) = self.connection.get_window_attributes(event.window)?.reply() else {
            return Ok(());
        };
        if attributes.override_redirect {
            return Ok(());
        }

        if !self.config.alt_tray_instance.is_empty()
            && self.wm_class_contains(
                event.window,
                self.config.alt_bar_class,
                self.config.alt_tray_instance,
            )?
        {
            self.manage_tray(event.window)?;
        } else if self.wm_class_contains(event.window, self.config.alt_bar_class, "")? {
            self.manage_alt_bar(event.window)?;
        } else if !self.clients.contains_key(&event.window) {
            self.manage(event.window)?;
        }
        Ok(())
    }

    fn motion_notify(&mut self, event: MotionNotifyEvent) -> WmResult<()> {
        if event.event != self.root {
            return Ok(());
        }

        let pointer = Rect {
            x: event.root_x as i32,
            y: event.root_y as i32,
            w: 1,
            h: 1,
        };
        let monitor = monitor::rect_to_monitor(&self.monitors, pointer, self.selected_monitor);
        if let Some(previous) = self.motion_monitor
            && monitor != previous
        {
            let selected = self.monitors[self.selected_monitor].sel;
            self.unfocus(selected, true)?;
            self.selected_monitor = monitor;
            self.focus(None)?;
        }
        self.motion_monitor = Some(monitor);
        Ok(())
    }

    fn property_notify(&mut self, event: PropertyNotifyEvent) -> WmResult<()> {
        if event.state == Property::DELETE {
            return Ok(());
        }
        let window = event.window;
        if !self.clients.contains_key(&window) {
            return Ok(());
        }

        if event.atom == Atom::from(AtomEnum::WM_TRANSIENT_FOR) {
            // a window turning transient for a managed client floats from
            // now on
            if !self.clients[&window].is_floating
                && let Some(parent) = self.transient_for(window)
                && self.clients.contains_key(&parent)
            {
                if let Some(client) = self.clients.get_mut(&window) {
                    client.is_floating = true;
                }
                let monitor_index = self.clients[&window].monitor_index;
                self.arrange(Some(monitor_index))?;
            }
        } else if event.atom == Atom::from(AtomEnum::WM_NORMAL_HINTS) {
            self.update_size_hints(window)?;
        } else if event.atom == Atom::from(AtomEnum::WM_HINTS) {
            self.update_wm_hints(window)?;
        }

        if event.atom == self.atoms.wm_name || event.atom == self.atoms.net_wm_name {
            self.update_title(window)?;
        }
        if event.atom == self.atoms.net_wm_window_type {
            self.update_window_type(window)?;
        }
        Ok(())
    }

    fn unmap_notify(&mut self, event: UnmapNotifyEvent) -> WmResult<()> {
        if self.clients.contains_key(&event.window) {
            let synthetic = event.response_type & 0x80 != 0;
            if synthetic {
                // ICCCM withdrawal request
                self.set_client_state(event.window, WITHDRAWN_STATE)?;
            } else {
                self.unmanage(event.window, false)?;
            }
        } else if self
            .monitors
            .iter()
            .any(|m| m.bar_window == Some(event.window))
        {
            self.unmanage_alt_bar(event.window)?;
        } else if self
            .monitors
            .iter()
            .any(|m| m.tray_window == Some(event.window))
        {
            self.unmanage_tray(event.window)?;
        }
        Ok(())
    }

    fn manage(&mut self, window: Window) -> WmResult<()> {
        if self.clients.contains_key(&window) {
            return Ok(());
        }
        let Ok(geometry) = self.connection.get_geometry(window)?.reply() else {
            return Ok(());
        };

        let transient_parent = self
            .transient_for(window)
            .filter(|parent| self.clients.contains_key(parent));

        let mut new_client = Client::new(window, self.selected_monitor, 0);
        new_client.x = geometry.x as i32;
        new_client.y = geometry.y as i32;
        new_client.w = geometry.width as i32;
        new_client.h = geometry.height as i32;
        new_client.old_x = new_client.x;
        new_client.old_y = new_client.y;
        new_client.old_w = new_client.w;
        new_client.old_h = new_client.h;
        new_client.old_border_width = geometry.border_width as i32;
        new_client.border_width = self.config.border_width;
        self.clients.insert(window, new_client);

        self.update_title(window)?;

        if let Some(parent) = transient_parent {
            let (parent_monitor, parent_tags) = {
                let parent = &self.clients[&parent];
                (parent.monitor_index, parent.tags)
            };
            if let Some(client) = self.clients.get_mut(&window) {
                client.monitor_index = parent_monitor;
                client.tags = parent_tags;
            }
        } else {
            self.apply_rules(window)?;
        }

        let monitor_index = self.clients[&window].monitor_index;
        let (mx, my, mw, mh, wx, ww, by, bh) = {
            let m = &self.monitors[monitor_index];
            (m.mx, m.my, m.mw, m.mh, m.wx, m.ww, m.by, m.bh)
        };
        if let Some(c) = self.clients.get_mut(&window) {
            if c.x + c.width_with_border() > mx + mw {
                c.x = mx + mw - c.width_with_border();
            }
            if c.y + c.height_with_border() > my + mh {
                c.y = my + mh - c.height_with_border();
            }
            c.x = c.x.max(mx);
            // keep the client clear of a top bar when its center sits over it
            let over_bar = by == my && c.x + c.w / 2 >= wx && c.x + c.w / 2 < wx + ww;
            c.y = c.y.max(if over_bar { my + bh } else { my });
        }

        self.connection.configure_window(
            window,
            &ConfigureWindowAux::new().border_width(self.config.border_width as u32),
        )?;
        self.connection.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().border_pixel(self.config.border_unfocused),
        )?;
        self.send_configure_notify(window)?;
        self.update_size_hints(window)?;
        self.update_wm_hints(window)?;
        self.connection.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(
                EventMask::ENTER_WINDOW
                    | EventMask::FOCUS_CHANGE
                    | EventMask::PROPERTY_CHANGE
                    | EventMask::STRUCTURE_NOTIFY,
            ),
        )?;
        self.grab_buttons(window, false)?;

        let is_transient = transient_parent.is_some();
        if let Some(client) = self.clients.get_mut(&window)
            && !client.is_floating
        {
            client.is_floating = is_transient || client.is_fixed;
            client.old_state = client.is_floating;
        }
        if self.clients[&window].is_floating {
            self.connection.configure_window(
                window,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )?;
        }

        client::attach(&mut self.clients, &mut self.monitors[monitor_index], window);
        client::attach_stack(&mut self.clients, &mut self.monitors[monitor_index], window);
        self.windows.push(window);
        self.connection.change_property32(
            PropMode::APPEND,
            self.root,
            self.atoms.net_client_list,
            AtomEnum::WINDOW,
            &[window],
        )?;

        // a fullscreen request in the type property must see the client
        // already linked into both lists
        self.update_window_type(window)?;

        let (x, y, w, h) = {
            let c = &self.clients[&window];
            (c.x, c.y, c.w, c.h)
        };
        // some clients need a configure at an off-screen position before the
        // first map
        self.connection.configure_window(
            window,
            &ConfigureWindowAux::new()
                .x(x + 2 * self.screen_width)
                .y(y)
                .width(w as u32)
                .height(h as u32),
        )?;
        self.set_client_state(window, NORMAL_STATE)?;

        if monitor_index == self.selected_monitor {
            let selected = self.monitors[self.selected_monitor].sel;
            self.unfocus(selected, false)?;
        }
        self.monitors[monitor_index].sel = Some(window);
        self.arrange(Some(monitor_index))?;
        self.connection.map_window(window)?;
        self.focus(None)?;

        debug!("managed {:#x} on monitor {}", window, monitor_index);
        Ok(())
    }

    fn apply_rules(&mut self, window: Window) -> WmResult<()> {
        let (class, instance) = self.window_class_instance(window)?;
        let title = self
            .clients
            .get(&window)
            .map(|c| c.name.clone())
            .unwrap_or_default();

        let mut tags: TagMask = 0;
        let mut floating = false;
        let mut monitor: Option<usize> = None;
        for rule in &self.config.rules {
            if rule.matches(&class, &instance, &title) {
                floating = rule.is_floating;
                tags |= rule.tags;
                if let Some(index) = rule.monitor
                    && index < self.monitors.len()
                {
                    monitor = Some(index);
                }
            }
        }

        let all_tags = self.config.all_tags();
        let fallback = self.monitors[monitor.unwrap_or(self.selected_monitor)].selected_tagset();
        if let Some(client) = self.clients.get_mut(&window) {
            client.is_floating = floating;
            if let Some(index) = monitor {
                client.monitor_index = index;
            }
            client.tags = if tags & all_tags != 0 {
                tags & all_tags
            } else {
                fallback
            };
        }
        Ok(())
    }

    fn unmanage(&mut self, window: Window, destroyed: bool) -> WmResult<()> {
        let Some((monitor_index, old_border)) = self
            .clients
            .get(&window)
            .map(|c| (c.monitor_index, c.old_border_width))
        else {
            return Ok(());
        };

        client::detach(&mut self.clients, &mut self.monitors[monitor_index], window);
        client::detach_stack(&mut self.clients, &mut self.monitors[monitor_index], window);

        if !destroyed {
            // the window outlives us; undo our changes without racing its
            // destruction
            self.connection.grab_server()?;
            self.connection.configure_window(
                window,
                &ConfigureWindowAux::new().border_width(old_border as u32),
            )?;
            self.connection
                .ungrab_button(ButtonIndex::ANY, window, ModMask::ANY)?;
            self.set_client_state(window, WITHDRAWN_STATE)?;
            self.sync()?;
            self.connection.ungrab_server()?;
        }

        self.clients.remove(&window);
        self.windows.retain(|&w| w != window);
        self.focus(None)?;
        self.update_client_list()?;
        self.arrange(Some(monitor_index))?;

        debug!("unmanaged {:#x}", window);
        Ok(())
    }

    /// Record an external status bar and reserve its band.
    fn manage_alt_bar(&mut self, window: Window) -> WmResult<()> {
        let Ok(geometry) = self.connection.get_geometry(window)?.reply() else {
            return Ok(());
        };
        let rect = Rect {
            x: geometry.x as i32,
            y: geometry.y as i32,
            w: geometry.width as i32,
            h: geometry.height as i32,
        };
        let index = monitor::rect_to_monitor(&self.monitors, rect, self.selected_monitor);

        {
            let monitor = &mut self.monitors[index];
            monitor.bar_window = Some(window);
            monitor.bh = rect.h;
            monitor.update_bar_pos();
        }
        self.arrange(Some(index))?;

        self.connection.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(
                EventMask::ENTER_WINDOW
                    | EventMask::FOCUS_CHANGE
                    | EventMask::PROPERTY_CHANGE
                    | EventMask::STRUCTURE_NOTIFY,
            ),
        )?;
        self.connection.configure_window(
            window,
            &ConfigureWindowAux::new()
                .x(rect.x)
                .y(rect.y)
                .width(rect.w as u32)
                .height(rect.h as u32),
        )?;
        self.connection.map_window(window)?;
        self.connection.change_property32(
            PropMode::APPEND,
            self.root,
            self.atoms.net_client_list,
            AtomEnum::WINDOW,
            &[window],
        )?;

        info!("external bar {:#x} registered on monitor {}", window, index);
        Ok(())
    }

    fn unmanage_alt_bar(&mut self, window: Window) -> WmResult<()> {
        let Some(index) = self
            .monitors
            .iter()
            .position(|m| m.bar_window == Some(window))
        else {
            return Ok(());
        };
        {
            let monitor = &mut self.monitors[index];
            monitor.bar_window = None;
            monitor.by = 0;
            monitor.bh = 0;
            monitor.update_bar_pos();
        }
        self.arrange(Some(index))?;
        info!("external bar on monitor {} gone", index);
        Ok(())
    }

    /// A tray window is reserved screen estate we acknowledge but never
    /// draw to or focus.
    fn manage_tray(&mut self, window: Window) -> WmResult<()> {
        let Ok(geometry) = self.connection.get_geometry(window)?.reply() else {
            return Ok(());
        };
        let rect = Rect {
            x: geometry.x as i32,
            y: geometry.y as i32,
            w: geometry.width as i32,
            h: geometry.height as i32,
        };
        let index = monitor::rect_to_monitor(&self.monitors, rect, self.selected_monitor);

        self.monitors[index].tray_window = Some(window);
        self.connection.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(EventMask::STRUCTURE_NOTIFY),
        )?;
        self.connection.map_window(window)?;

        info!("tray window {:#x} registered on monitor {}", window, index);
        Ok(())
    }

    fn unmanage_tray(&mut self, window: Window) -> WmResult<()> {
        let Some(index) = self
            .monitors
            .iter()
            .position(|m| m.tray_window == Some(window))
        else {
            return Ok(());
        };
        {
            let monitor = &mut self.monitors[index];
            monitor.tray_window = None;
            monitor.update_bar_pos();
        }
        self.arrange(Some(index))?;
        Ok(())
    }

    fn is_visible(&self, window: Window) -> bool {
        self.clients.get(&window).is_some_and(|client| {
            self.monitors
                .get(client.monitor_index)
                .is_some_and(|monitor| client.is_visible_on(monitor))
        })
    }

    fn focus(&mut self, window: Option<Window>) -> WmResult<()> {
        let mut target = window.filter(|&w| self.is_visible(w));
        if target.is_none() {
            target =
                client::topmost_visible(&self.clients, &self.monitors[self.selected_monitor]);
        }

        let previous = self.monitors[self.selected_monitor].sel;
        if previous.is_some() && previous != target {
            self.unfocus(previous, false)?;
        }

        if let Some(window) = target {
            let monitor_index = self.clients[&window].monitor_index;
            if monitor_index != self.selected_monitor {
                self.selected_monitor = monitor_index;
            }
            if self.clients[&window].is_urgent {
                self.set_urgent(window, false)?;
            }
            client::detach_stack(&mut self.clients, &mut self.monitors[monitor_index], window);
            client::attach_stack(&mut self.clients, &mut self.monitors[monitor_index], window);
            self.grab_buttons(window, true)?;
            self.connection.change_window_attributes(
                window,
                &ChangeWindowAttributesAux::new().border_pixel(self.config.border_focused),
            )?;
            self.set_focus(window)?;
        } else {
            self.connection.set_input_focus(
                InputFocus::POINTER_ROOT,
                self.root,
                x11rb::CURRENT_TIME,
            )?;
            self.connection
                .delete_property(self.root, self.atoms.net_active_window)?;
        }
        self.monitors[self.selected_monitor].sel = target;
        Ok(())
    }

    fn unfocus(&mut self, window: Option<Window>, reset_input_focus: bool) -> WmResult<()> {
        let Some(window) = window else {
            return Ok(());
        };
        if !self.clients.contains_key(&window) {
            return Ok(());
        }

        self.grab_buttons(window, false)?;
        self.connection.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().border_pixel(self.config.border_unfocused),
        )?;
        if reset_input_focus {
            self.connection.set_input_focus(
                InputFocus::POINTER_ROOT,
                self.root,
                x11rb::CURRENT_TIME,
            )?;
            self.connection
                .delete_property(self.root, self.atoms.net_active_window)?;
        }
        Ok(())
    }

    fn set_focus(&mut self, window: Window) -> WmResult<()> {
        if !self.clients.get(&window).is_some_and(|c| c.never_focus) {
            self.connection.set_input_focus(
                InputFocus::POINTER_ROOT,
                window,
                x11rb::CURRENT_TIME,
            )?;
            self.connection.change_property32(
                PropMode::REPLACE,
                self.root,
                self.atoms.net_active_window,
                AtomEnum::WINDOW,
                &[window],
            )?;
        }
        self.send_protocol_event(window, self.atoms.wm_take_focus)?;
        Ok(())
    }

    fn restack(&mut self, monitor_index: usize) -> WmResult<()> {
        let Some(selected) = self.monitors[monitor_index].sel else {
            return Ok(());
        };
        if self.clients.get(&selected).is_some_and(|c| c.is_floating) {
            self.connection.configure_window(
                selected,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )?;
        }
        self.drain_enter_notify()?;
        Ok(())
    }

    /// Restacking and resize loops generate crossing events that would
    /// spuriously refocus; throw them away, keep everything else.
    fn drain_enter_notify(&mut self) -> WmResult<()> {
        self.sync()?;
        while let Some(event) = self.connection.poll_for_event()? {
            if !matches!(event, Event::EnterNotify(_)) {
                self.pending.push_back(event);
            }
        }
        Ok(())
    }

    fn focus_stack(&mut self, direction: i32) -> WmResult<()> {
        let monitor_index = self.selected_monitor;
        let Some(selected) = self.monitors[monitor_index].sel else {
            return Ok(());
        };

        let visible: Vec<Window> =
            client::arrangement(&self.clients, &self.monitors[monitor_index])
                .into_iter()
                .filter(|&w| self.is_visible(w))
                .collect();
        if visible.is_empty() {
            return Ok(());
        }
        let Some(position) = visible.iter().position(|&w| w == selected) else {
            return Ok(());
        };

        let next = if direction > 0 {
            visible[(position + 1) % visible.len()]
        } else {
            visible[(position + visible.len() - 1) % visible.len()]
        };
        self.focus(Some(next))?;
        self.restack(monitor_index)?;
        Ok(())
    }

    /// Promote the selection to master; a master already on top swaps with
    /// the next tiled client instead.
    fn zoom(&mut self) -> WmResult<()> {
        let monitor_index = self.selected_monitor;
        let Some(selected) = self.monitors[monitor_index].sel else {
            return Ok(());
        };
        if self.clients.get(&selected).is_some_and(|c| c.is_floating) {
            return Ok(());
        }

        let mut target = selected;
        let head = self.monitors[monitor_index].clients_head;
        if client::next_tiled(&self.clients, &self.monitors[monitor_index], head)
            == Some(selected)
        {
            let after = self.clients.get(&selected).and_then(|c| c.next);
            match client::next_tiled(&self.clients, &self.monitors[monitor_index], after) {
                Some(second) => target = second,
                None => return Ok(()),
            }
        }
        self.pop(target)
    }

    fn pop(&mut self, window: Window) -> WmResult<()> {
        let Some(monitor_index) = self.clients.get(&window).map(|c| c.monitor_index) else {
            return Ok(());
        };
        client::detach(&mut self.clients, &mut self.monitors[monitor_index], window);
        client::attach(&mut self.clients, &mut self.monitors[monitor_index], window);
        self.focus(Some(window))?;
        self.arrange(Some(monitor_index))?;
        Ok(())
    }

    fn arrange(&mut self, monitor: Option<usize>) -> WmResult<()> {
        match monitor {
            Some(index) => {
                self.show_hide(index)?;
                self.tile(index)?;
                self.restack(index)?;
            }
            None => {
                for index in 0..self.monitors.len() {
                    self.show_hide(index)?;
                }
                for index in 0..self.monitors.len() {
                    self.tile(index)?;
                }
            }
        }
        Ok(())
    }

    /// Move visible clients back on screen top-down, hidden ones off screen
    /// bottom-up.
    fn show_hide(&mut self, monitor_index: usize) -> WmResult<()> {
        let stack = client::stack_order(&self.clients, &self.monitors[monitor_index]);

        for &window in &stack {
            if !self.is_visible(window) {
                continue;
            }
            let Some((x, y, w, h, floating, fullscreen)) = self.clients.get(&window).map(|c| {
                (c.x, c.y, c.w, c.h, c.is_floating, c.is_fullscreen)
            }) else {
                continue;
            };
            self.connection
                .configure_window(window, &ConfigureWindowAux::new().x(x).y(y))?;
            if floating && !fullscreen {
                self.resize(window, x, y, w, h, false)?;
            }
        }

        for &window in stack.iter().rev() {
            if self.is_visible(window) {
                continue;
            }
            let Some((width, y)) = self
                .clients
                .get(&window)
                .map(|c| (c.width_with_border(), c.y))
            else {
                continue;
            };
            self.connection
                .configure_window(window, &ConfigureWindowAux::new().x(-2 * width).y(y))?;
        }
        Ok(())
    }

    fn tile(&mut self, monitor_index: usize) -> WmResult<()> {
        let mut tiled: Vec<Window> = Vec::new();
        let mut current = client::next_tiled(
            &self.clients,
            &self.monitors[monitor_index],
            self.monitors[monitor_index].clients_head,
        );
        while let Some(window) = current {
            tiled.push(window);
            let after = self.clients.get(&window).and_then(|c| c.next);
            current = client::next_tiled(&self.clients, &self.monitors[monitor_index], after);
        }
        if tiled.is_empty() {
            return Ok(());
        }

        let params = {
            let m = &self.monitors[monitor_index];
            TileParams {
                work: m.work_rect(),
                gappx: m.gappx,
                mfact: m.mfact,
                nmaster: m.nmaster,
            }
        };
        let borders: Vec<i32> = tiled
            .iter()
            .filter_map(|w| self.clients.get(w).map(|c| c.border_width))
            .collect();

        let rects = layout::master_stack(&params, &borders);
        for (&window, rect) in tiled.iter().zip(rects.iter()) {
            self.resize(window, rect.x, rect.y, rect.w, rect.h, false)?;
        }
        Ok(())
    }

    fn resize(
        &mut self,
        window: Window,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        interact: bool,
    ) -> WmResult<()> {
        if let Some((x, y, w, h)) = self.apply_size_hints(window, x, y, w, h, interact) {
            self.resize_client(window, x, y, w, h)?;
        }
        Ok(())
    }

    /// Clamp the rectangle onto the work area (or the whole screen during
    /// interactive moves), then normalize per ICCCM. Returns None when
    /// nothing would change.
    fn apply_size_hints(
        &mut self,
        window: Window,
        mut x: i32,
        mut y: i32,
        mut w: i32,
        mut h: i32,
        interact: bool,
    ) -> Option<(i32, i32, i32, i32)> {
        let client = self.clients.get(&window)?;
        let monitor = self.monitors.get(client.monitor_index)?;

        w = w.max(1);
        h = h.max(1);

        let full_w = client.width_with_border();
        let full_h = client.height_with_border();
        let bw = client.border_width;
        if interact {
            if x > self.screen_width {
                x = self.screen_width - full_w;
            }
            if y > self.screen_height {
                y = self.screen_height - full_h;
            }
            if x + w + 2 * bw < 0 {
                x = 0;
            }
            if y + h + 2 * bw < 0 {
                y = 0;
            }
        } else {
            if x >= monitor.wx + monitor.ww {
                x = monitor.wx + monitor.ww - full_w;
            }
            if y >= monitor.wy + monitor.wh {
                y = monitor.wy + monitor.wh - full_h;
            }
            if x + w + 2 * bw <= monitor.wx {
                x = monitor.wx;
            }
            if y + h + 2 * bw <= monitor.wy {
                y = monitor.wy;
            }
        }

        if h < monitor.bh {
            h = monitor.bh;
        }
        if w < monitor.bh {
            w = monitor.bh;
        }

        if self.config.resize_hints || client.is_floating {
            let (hinted_w, hinted_h) = client.adjust_to_hints(w, h);
            w = hinted_w;
            h = hinted_h;
        }

        let changed = x != client.x || y != client.y || w != client.w || h != client.h;
        changed.then_some((x, y, w, h))
    }

    fn resize_client(&mut self, window: Window, x: i32, y: i32, w: i32, h: i32) -> WmResult<()> {
        let border = {
            let Some(client) = self.clients.get_mut(&window) else {
                return Ok(());
            };
            client.old_x = client.x;
            client.old_y = client.y;
            client.old_w = client.w;
            client.old_h = client.h;
            client.x = x;
            client.y = y;
            client.w = w;
            client.h = h;
            client.border_width
        };
        self.connection.configure_window(
            window,
            &ConfigureWindowAux::new()
                .x(x)
                .y(y)
                .width(w as u32)
                .height(h as u32)
                .border_width(border as u32),
        )?;
        self.send_configure_notify(window)?;
        self.sync()?;
        Ok(())
    }

    fn send_configure_notify(&self, window: Window) -> WmResult<()> {
        let Some(client) = self.clients.get(&window) else {
            return Ok(());
        };
        let event = ConfigureNotifyEvent {
            response_type: CONFIGURE_NOTIFY_EVENT,
            sequence: 0,
            event: window,
            window,
            above_sibling: x11rb::NONE,
            x: client.x as i16,
            y: client.y as i16,
            width: client.w as u16,
            height: client.h as u16,
            border_width: client.border_width as u16,
            override_redirect: false,
        };
        self.connection
            .send_event(false, window, EventMask::STRUCTURE_NOTIFY, event)?;
        Ok(())
    }

    fn view(&mut self, mask: TagMask) -> WmResult<()> {
        let all_tags = self.config.all_tags();
        if self.monitors[self.selected_monitor].view(mask, all_tags) {
            self.focus(None)?;
            self.arrange(Some(self.selected_monitor))?;
        }
        Ok(())
    }

    fn toggle_view(&mut self, mask: TagMask) -> WmResult<()> {
        let all_tags = self.config.all_tags();
        if self.monitors[self.selected_monitor].toggle_view(mask, all_tags) {
            self.focus(None)?;
            self.arrange(Some(self.selected_monitor))?;
        }
        Ok(())
    }

    fn toggle_tag(&mut self, mask: TagMask) -> WmResult<()> {
        let all_tags = self.config.all_tags();
        let Some(selected) = self.monitors[self.selected_monitor].sel else {
            return Ok(());
        };
        let changed = self
            .clients
            .get_mut(&selected)
            .is_some_and(|c| c.toggle_tags(mask, all_tags));
        if changed {
            self.focus(None)?;
            self.arrange(Some(self.selected_monitor))?;
        }
        Ok(())
    }

    /// Like view, but successive invocations while the modifier is held
    /// union into the active set.
    fn combo_view(&mut self, mask: TagMask) -> WmResult<()> {
        let all_tags = self.config.all_tags();
        let composing = self.combo;
        self.combo = true;
        self.monitors[self.selected_monitor].combo_view(mask, all_tags, composing);
        self.focus(None)?;
        self.arrange(Some(self.selected_monitor))?;
        Ok(())
    }

    fn combo_tag(&mut self, mask: TagMask) -> WmResult<()> {
        let all_tags = self.config.all_tags();
        if mask & all_tags == 0 {
            return Ok(());
        }
        let Some(selected) = self.monitors[self.selected_monitor].sel else {
            return Ok(());
        };

        let composing = self.combo;
        self.combo = true;
        if let Some(client) = self.clients.get_mut(&selected) {
            client.combo_tags(mask, all_tags, composing);
        }
        self.focus(None)?;
        self.arrange(Some(self.selected_monitor))?;
        Ok(())
    }

    fn set_mfact(&mut self, delta: f32) -> WmResult<()> {
        let factor = {
            let monitor = &self.monitors[self.selected_monitor];
            if delta < 1.0 {
                delta + monitor.mfact
            } else {
                delta - 1.0
            }
        };
        if !(0.05..=0.95).contains(&factor) {
            return Ok(());
        }
        self.monitors[self.selected_monitor].mfact = factor;
        self.arrange(Some(self.selected_monitor))?;
        Ok(())
    }

    fn inc_nmaster(&mut self, delta: i32) -> WmResult<()> {
        {
            let monitor = &mut self.monitors[self.selected_monitor];
            monitor.nmaster = (monitor.nmaster + delta).max(0);
        }
        self.arrange(Some(self.selected_monitor))?;
        Ok(())
    }

    fn toggle_floating(&mut self) -> WmResult<()> {
        let Some(selected) = self.monitors[self.selected_monitor].sel else {
            return Ok(());
        };
        if self.clients.get(&selected).is_some_and(|c| c.is_fullscreen) {
            return Ok(());
        }

        let (floating, x, y, w, h) = {
            let Some(client) = self.clients.get_mut(&selected) else {
                return Ok(());
            };
            client.is_floating = !client.is_floating || client.is_fixed;
            (client.is_floating, client.x, client.y, client.w, client.h)
        };
        if floating {
            self.resize(selected, x, y, w, h, false)?;
        }
        self.arrange(Some(self.selected_monitor))?;
        Ok(())
    }

    fn set_fullscreen(&mut self, window: Window, fullscreen: bool) -> WmResult<()> {
        let Some(currently) = self.clients.get(&window).map(|c| c.is_fullscreen) else {
            return Ok(());
        };

        if fullscreen && !currently {
            self.connection.change_property32(
                PropMode::REPLACE,
                window,
                self.atoms.net_wm_state,
                AtomEnum::ATOM,
                &[self.atoms.net_wm_state_fullscreen],
            )?;

            let monitor_index = self.clients[&window].monitor_index;
            let screen_rect = self.monitors[monitor_index].screen_rect();
            if let Some(client) = self.clients.get_mut(&window) {
                client.is_fullscreen = true;
                client.old_state = client.is_floating;
                client.old_border_width = client.border_width;
                client.border_width = 0;
                client.is_floating = true;
            }
            self.resize_client(
                window,
                screen_rect.x,
                screen_rect.y,
                screen_rect.w,
                screen_rect.h,
            )?;
            self.connection.configure_window(
                window,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )?;
        } else if !fullscreen && currently {
            self.connection.change_property32(
                PropMode::REPLACE,
                window,
                self.atoms.net_wm_state,
                AtomEnum::ATOM,
                &[],
            )?;

            let (x, y, w, h, monitor_index) = {
                let Some(client) = self.clients.get_mut(&window) else {
                    return Ok(());
                };
                client.is_fullscreen = false;
                client.is_floating = client.old_state;
                client.border_width = client.old_border_width;
                client.x = client.old_x;
                client.y = client.old_y;
                client.w = client.old_w;
                client.h = client.old_h;
                (client.x, client.y, client.w, client.h, client.monitor_index)
            };
            self.resize_client(window, x, y, w, h)?;
            self.arrange(Some(monitor_index))?;
        }
        Ok(())
    }

    /// Modal move loop: drags follow the pointer at ~60 Hz, edges snap to
    /// the work area, and dragging a tiled client far enough floats it.
    fn move_mouse(&mut self) -> WmResult<()> {
        let Some(window) = self.monitors[self.selected_monitor].sel else {
            return Ok(());
        };
        if self.clients.get(&window).is_some_and(|c| c.is_fullscreen) {
            return Ok(());
        }
        self.restack(self.selected_monitor)?;

        let (orig_x, orig_y) = {
            let c = &self.clients[&window];
            (c.x, c.y)
        };

        let grab = self
            .connection
            .grab_pointer(
                false,
                self.root,
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                self.cursors.moving,
                x11rb::CURRENT_TIME,
            )?
            .reply()?;
        if grab.status != GrabStatus::SUCCESS {
            return Ok(());
        }

        let pointer = self.connection.query_pointer(self.root)?.reply()?;
        let (start_x, start_y) = (pointer.root_x as i32, pointer.root_y as i32);
        let mut last_motion: u32 = 0;

        loop {
            self.connection.flush()?;
            let event = self.connection.wait_for_event()?;
            match event {
                Event::ConfigureRequest(_) | Event::Expose(_) | Event::MapRequest(_) => {
                    self.handle_event(event)?;
                }
                Event::MotionNotify(motion) => {
                    if motion.time.wrapping_sub(last_motion) <= MOTION_INTERVAL_MS {
                        continue;
                    }
                    last_motion = motion.time;

                    let Some((cur_x, cur_y, full_w, full_h, floating)) =
                        self.clients.get(&window).map(|c| {
                            (
                                c.x,
                                c.y,
                                c.width_with_border(),
                                c.height_with_border(),
                                c.is_floating,
                            )
                        })
                    else {
                        continue;
                    };
                    let (wx, wy, ww, wh) = {
                        let m = &self.monitors[self.selected_monitor];
                        (m.wx, m.wy, m.ww, m.wh)
                    };

                    let mut nx = orig_x + (motion.root_x as i32 - start_x);
                    let mut ny = orig_y + (motion.root_y as i32 - start_y);
                    if (wx - nx).abs() < self.config.snap {
                        nx = wx;
                    } else if ((wx + ww) - (nx + full_w)).abs() < self.config.snap {
                        nx = wx + ww - full_w;
                    }
                    if (wy - ny).abs() < self.config.snap {
                        ny = wy;
                    } else if ((wy + wh) - (ny + full_h)).abs() < self.config.snap {
                        ny = wy + wh - full_h;
                    }

                    if !floating
                        && ((nx - cur_x).abs() > self.config.snap
                            || (ny - cur_y).abs() > self.config.snap)
                    {
                        self.toggle_floating()?;
                    }
                    let (floating, w, h) = {
                        let Some(c) = self.clients.get(&window) else {
                            continue;
                        };
                        (c.is_floating, c.w, c.h)
                    };
                    if floating {
                        self.resize(window, nx, ny, w, h, true)?;
                    }
                }
                Event::ButtonRelease(_) => break,
                other => self.pending.push_back(other),
            }
        }
        self.connection.ungrab_pointer(x11rb::CURRENT_TIME)?;

        self.reassign_after_drag(window)?;
        Ok(())
    }

    /// Modal resize loop. The pointer is parked on the bottom-right corner
    /// for the duration of the drag.
    fn resize_mouse(&mut self) -> WmResult<()> {
        let Some(window) = self.monitors[self.selected_monitor].sel else {
            return Ok(());
        };
        if self.clients.get(&window).is_some_and(|c| c.is_fullscreen) {
            return Ok(());
        }
        self.restack(self.selected_monitor)?;

        let (orig_x, orig_y, border) = {
            let c = &self.clients[&window];
            (c.x, c.y, c.border_width)
        };

        let grab = self
            .connection
            .grab_pointer(
                false,
                self.root,
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                self.cursors.resize,
                x11rb::CURRENT_TIME,
            )?
            .reply()?;
        if grab.status != GrabStatus::SUCCESS {
            return Ok(());
        }

        {
            let c = &self.clients[&window];
            self.connection.warp_pointer(
                x11rb::NONE,
                window,
                0,
                0,
                0,
                0,
                (c.w + c.border_width - 1) as i16,
                (c.h + c.border_width - 1) as i16,
            )?;
        }

        let mut last_motion: u32 = 0;
        loop {
            self.connection.flush()?;
            let event = self.connection.wait_for_event()?;
            match event {
                Event::ConfigureRequest(_) | Event::Expose(_) | Event::MapRequest(_) => {
                    self.handle_event(event)?;
                }
                Event::MotionNotify(motion) => {
                    if motion.time.wrapping_sub(last_motion) <= MOTION_INTERVAL_MS {
                        continue;
                    }
                    last_motion = motion.time;

                    let nw = (motion.root_x as i32 - orig_x - 2 * border + 1).max(1);
                    let nh = (motion.root_y as i32 - orig_y - 2 * border + 1).max(1);

                    let Some((cw, ch, cx, cy, floating, client_monitor)) =
                        self.clients.get(&window).map(|c| {
                            (c.w, c.h, c.x, c.y, c.is_floating, c.monitor_index)
                        })
                    else {
                        continue;
                    };
                    let inside_work_area = {
                        let selmon = &self.monitors[self.selected_monitor];
                        let client_mon = &self.monitors[client_monitor];
                        client_mon.wx + nw >= selmon.wx
                            && client_mon.wx + nw <= selmon.wx + selmon.ww
                            && client_mon.wy + nh >= selmon.wy
                            && client_mon.wy + nh <= selmon.wy + selmon.wh
                    };
                    if inside_work_area
                        && !floating
                        && ((nw - cw).abs() > self.config.snap
                            || (nh - ch).abs() > self.config.snap)
                    {
                        self.toggle_floating()?;
                    }
                    let floating = self
                        .clients
                        .get(&window)
                        .is_some_and(|c| c.is_floating);
                    if floating {
                        self.resize(window, cx, cy, nw, nh, true)?;
                    }
                }
                Event::ButtonRelease(_) => break,
                other => self.pending.push_back(other),
            }
        }

        if let Some(c) = self.clients.get(&window) {
            self.connection.warp_pointer(
                x11rb::NONE,
                window,
                0,
                0,
                0,
                0,
                (c.w + c.border_width - 1) as i16,
                (c.h + c.border_width - 1) as i16,
            )?;
        }
        self.connection.ungrab_pointer(x11rb::CURRENT_TIME)?;
        self.drain_enter_notify()?;

        self.reassign_after_drag(window)?;
        Ok(())
    }

    /// A drag that ends mostly on another monitor moves the client there.
    fn reassign_after_drag(&mut self, window: Window) -> WmResult<()> {
        let Some(rect) = self.clients.get(&window).map(|c| Rect {
            x: c.x,
            y: c.y,
            w: c.w,
            h: c.h,
        }) else {
            return Ok(());
        };
        let target = monitor::rect_to_monitor(&self.monitors, rect, self.selected_monitor);
        if target != self.selected_monitor {
            self.send_to_monitor(window, target)?;
            self.selected_monitor = target;
            self.focus(None)?;
        }
        Ok(())
    }

    fn send_to_monitor(&mut self, window: Window, target: usize) -> WmResult<()> {
        let Some(source) = self.clients.get(&window).map(|c| c.monitor_index) else {
            return Ok(());
        };
        if source == target {
            return Ok(());
        }

        self.unfocus(Some(window), true)?;
        client::detach(&mut self.clients, &mut self.monitors[source], window);
        client::detach_stack(&mut self.clients, &mut self.monitors[source], window);

        let tags = self.monitors[target].selected_tagset();
        if let Some(client) = self.clients.get_mut(&window) {
            client.monitor_index = target;
            client.tags = tags;
        }
        client::attach(&mut self.clients, &mut self.monitors[target], window);
        client::attach_stack(&mut self.clients, &mut self.monitors[target], window);

        self.focus(None)?;
        self.arrange(None)?;
        Ok(())
    }

    fn direction_to_monitor(&self, direction: i32) -> usize {
        let count = self.monitors.len();
        if direction > 0 {
            (self.selected_monitor + 1) % count
        } else {
            (self.selected_monitor + count - 1) % count
        }
    }

    fn focus_monitor(&mut self, direction: i32) -> WmResult<()> {
        if self.monitors.len() <= 1 {
            return Ok(());
        }
        let target = self.direction_to_monitor(direction);
        if target == self.selected_monitor {
            return Ok(());
        }
        let selected = self.monitors[self.selected_monitor].sel;
        self.unfocus(selected, false)?;
        self.selected_monitor = target;
        self.focus(None)?;
        Ok(())
    }

    fn tag_monitor(&mut self, direction: i32) -> WmResult<()> {
        if self.monitors.len() <= 1 {
            return Ok(());
        }
        let Some(selected) = self.monitors[self.selected_monitor].sel else {
            return Ok(());
        };
        let target = self.direction_to_monitor(direction);
        self.send_to_monitor(selected, target)
    }

    fn kill_client(&mut self) -> WmResult<()> {
        let Some(selected) = self.monitors[self.selected_monitor].sel else {
            return Ok(());
        };
        if !self.send_protocol_event(selected, self.atoms.wm_delete_window)? {
            // no WM_DELETE_WINDOW support; disconnect it the hard way
            self.connection.grab_server()?;
            self.connection.set_close_down_mode(CloseDown::DESTROY_ALL)?;
            self.connection.kill_client(selected)?;
            self.sync()?;
            self.connection.ungrab_server()?;
        }
        Ok(())
    }

    /// Deliver `protocol` via WM_PROTOCOLS if the client participates.
    fn send_protocol_event(&self, window: Window, protocol: Atom) -> WmResult<bool> {
        let Ok(reply) = self
            .connection
            .get_property(false, window, self.atoms.wm_protocols, AtomEnum::ATOM, 0, 32)?
            .reply()
        else {
            return Ok(false);
        };
        let supported = reply
            .value32()
            .map(|mut atoms| atoms.any(|atom| atom == protocol))
            .unwrap_or(false);
        if !supported {
            return Ok(false);
        }

        let message = ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: 32,
            sequence: 0,
            window,
            type_: self.atoms.wm_protocols,
            data: ClientMessageData::from([protocol, x11rb::CURRENT_TIME, 0, 0, 0]),
        };
        self.connection
            .send_event(false, window, EventMask::NO_EVENT, message)?;
        Ok(true)
    }

    fn set_urgent(&mut self, window: Window, urgent: bool) -> WmResult<()> {
        if let Some(client) = self.clients.get_mut(&window) {
            client.is_urgent = urgent;
        }

        let Ok(reply) = self
            .connection
            .get_property(false, window, AtomEnum::WM_HINTS, AtomEnum::WM_HINTS, 0, 9)?
            .reply()
        else {
            return Ok(());
        };
        let Some(mut values) = reply.value32().map(|v| v.collect::<Vec<u32>>()) else {
            return Ok(());
        };
        if values.is_empty() {
            return Ok(());
        }

        values[0] = if urgent {
            values[0] | URGENCY_HINT
        } else {
            values[0] & !URGENCY_HINT
        };
        self.connection.change_property32(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_HINTS,
            AtomEnum::WM_HINTS,
            &values,
        )?;
        Ok(())
    }

    fn update_geometry(&mut self) -> WmResult<bool> {
        let fallback = Rect {
            x: 0,
            y: 0,
            w: self.screen_width,
            h: self.screen_height,
        };
        let raw = monitor::query_screens(&self.connection, fallback)?;
        let unique = monitor::dedup_geometries(&raw);
        let dirty = monitor::reconcile(
            &mut self.monitors,
            &mut self.clients,
            &unique,
            self.config.mfact,
            self.config.nmaster,
            self.config.gappx,
        );
        if dirty {
            self.selected_monitor = 0;
            self.selected_monitor = self.window_to_monitor(self.root)?;
        }
        Ok(dirty)
    }

    fn window_to_monitor(&self, window: Window) -> WmResult<usize> {
        if window == self.root {
            let pointer = self.connection.query_pointer(self.root)?.reply()?;
            let at = Rect {
                x: pointer.root_x as i32,
                y: pointer.root_y as i32,
                w: 1,
                h: 1,
            };
            return Ok(monitor::rect_to_monitor(
                &self.monitors,
                at,
                self.selected_monitor,
            ));
        }
        if let Some(index) = self
            .monitors
            .iter()
            .position(|m| m.bar_window == Some(window) || m.tray_window == Some(window))
        {
            return Ok(index);
        }
        if let Some(client) = self.clients.get(&window) {
            return Ok(client.monitor_index);
        }
        Ok(self.selected_monitor)
    }

    fn update_size_hints(&mut self, window: Window) -> WmResult<()> {
        use crate::size_hints::{flags::*, offset::*};

        let values: Vec<u32> = self
            .connection
            .get_property(
                false,
                window,
                AtomEnum::WM_NORMAL_HINTS,
                AtomEnum::WM_SIZE_HINTS,
                0,
                crate::size_hints::LEN as u32,
            )?
            .reply()
            .ok()
            .and_then(|reply| reply.value32().map(|v| v.collect()))
            .unwrap_or_default();

        let Some(client) = self.clients.get_mut(&window) else {
            return Ok(());
        };

        if values.len() < crate::size_hints::LEN {
            client.base_w = 0;
            client.base_h = 0;
            client.inc_w = 0;
            client.inc_h = 0;
            client.max_w = 0;
            client.max_h = 0;
            client.min_w = 0;
            client.min_h = 0;
            client.min_aspect = 0.0;
            client.max_aspect = 0.0;
            client.is_fixed = false;
            return Ok(());
        }

        let hint_flags = values[FLAGS];

        if hint_flags & P_BASE_SIZE != 0 {
            client.base_w = values[BASE_WIDTH] as i32;
            client.base_h = values[BASE_HEIGHT] as i32;
        } else if hint_flags & P_MIN_SIZE != 0 {
            client.base_w = values[MIN_WIDTH] as i32;
            client.base_h = values[MIN_HEIGHT] as i32;
        } else {
            client.base_w = 0;
            client.base_h = 0;
        }

        if hint_flags & P_RESIZE_INC != 0 {
            client.inc_w = values[WIDTH_INC] as i32;
            client.inc_h = values[HEIGHT_INC] as i32;
        } else {
            client.inc_w = 0;
            client.inc_h = 0;
        }

        if hint_flags & P_MAX_SIZE != 0 {
            client.max_w = values[MAX_WIDTH] as i32;
            client.max_h = values[MAX_HEIGHT] as i32;
        } else {
            client.max_w = 0;
            client.max_h = 0;
        }

        if hint_flags & P_MIN_SIZE != 0 {
            client.min_w = values[MIN_WIDTH] as i32;
            client.min_h = values[MIN_HEIGHT] as i32;
        } else if hint_flags & P_BASE_SIZE != 0 {
            client.min_w = values[BASE_WIDTH] as i32;
            client.min_h = values[BASE_HEIGHT] as i32;
        } else {
            client.min_w = 0;
            client.min_h = 0;
        }

        if hint_flags & P_ASPECT != 0 {
            client.min_aspect =
                values[MIN_ASPECT_Y] as f32 / (values[MIN_ASPECT_X] as f32).max(1.0);
            client.max_aspect =
                values[MAX_ASPECT_X] as f32 / (values[MAX_ASPECT_Y] as f32).max(1.0);
        } else {
            client.min_aspect = 0.0;
            client.max_aspect = 0.0;
        }

        client.is_fixed = client.max_w > 0
            && client.max_h > 0
            && client.max_w == client.min_w
            && client.max_h == client.min_h;
        Ok(())
    }

    fn update_title(&mut self, window: Window) -> WmResult<()> {
        let mut name = match self.text_property(window, self.atoms.net_wm_name)? {
            Some(name) => name,
            None => self
                .text_property(window, self.atoms.wm_name)?
                .unwrap_or_default(),
        };
        if name.is_empty() {
            name = BROKEN_TITLE.to_string();
        }
        if let Some(client) = self.clients.get_mut(&window) {
            client.name = name;
        }
        Ok(())
    }

    fn text_property(&self, window: Window, property: Atom) -> WmResult<Option<String>> {
        let Ok(reply) = self
            .connection
            .get_property(
                false,
                window,
                property,
                AtomEnum::ANY,
                0,
                TITLE_MAX_BYTES as u32 / 4,
            )?
            .reply()
        else {
            return Ok(None);
        };
        if reply.value.is_empty() {
            return Ok(None);
        }

        let mut bytes = reply.value;
        bytes.truncate(TITLE_MAX_BYTES);
        let text = String::from_utf8_lossy(&bytes)
            .trim_end_matches('\0')
            .to_string();
        Ok((!text.is_empty()).then_some(text))
    }

    fn update_wm_hints(&mut self, window: Window) -> WmResult<()> {
        let Ok(reply) = self
            .connection
            .get_property(false, window, AtomEnum::WM_HINTS, AtomEnum::WM_HINTS, 0, 9)?
            .reply()
        else {
            return Ok(());
        };
        let Some(values) = reply.value32().map(|v| v.collect::<Vec<u32>>()) else {
            return Ok(());
        };
        if values.is_empty() {
            return Ok(());
        }

        let hint_flags = values[0];
        let selected = self.monitors[self.selected_monitor].sel;

        if Some(window) == selected && hint_flags & URGENCY_HINT != 0 {
            // the selected client never stays urgent; strip the hint
            let mut rewritten = values.clone();
            rewritten[0] = hint_flags & !URGENCY_HINT;
            self.connection.change_property32(
                PropMode::REPLACE,
                window,
                AtomEnum::WM_HINTS,
                AtomEnum::WM_HINTS,
                &rewritten,
            )?;
        } else if let Some(client) = self.clients.get_mut(&window) {
            client.is_urgent = hint_flags & URGENCY_HINT != 0;
        }

        if let Some(client) = self.clients.get_mut(&window) {
            client.never_focus = if values.len() > 1 && hint_flags & INPUT_HINT != 0 {
                values[1] == 0
            } else {
                false
            };
        }
        Ok(())
    }

    fn update_window_type(&mut self, window: Window) -> WmResult<()> {
        let state = self.atom_property(window, self.atoms.net_wm_state)?;
        let window_type = self.atom_property(window, self.atoms.net_wm_window_type)?;

        if state == Some(self.atoms.net_wm_state_fullscreen) {
            self.set_fullscreen(window, true)?;
        }
        if window_type == Some(self.atoms.net_wm_window_type_dialog)
            && let Some(client) = self.clients.get_mut(&window)
        {
            client.is_floating = true;
        }
        Ok(())
    }

    fn atom_property(&self, window: Window, property: Atom) -> WmResult<Option<Atom>> {
        let Ok(reply) = self
            .connection
            .get_property(false, window, property, AtomEnum::ATOM, 0, 1)?
            .reply()
        else {
            return Ok(None);
        };
        Ok(reply.value32().and_then(|mut atoms| atoms.next()))
    }

    fn window_state(&self, window: Window) -> WmResult<Option<u32>> {
        let Ok(reply) = self
            .connection
            .get_property(false, window, self.atoms.wm_state, self.atoms.wm_state, 0, 2)?
            .reply()
        else {
            return Ok(None);
        };
        Ok(reply.value32().and_then(|mut values| values.next()))
    }

    fn set_client_state(&self, window: Window, state: u32) -> WmResult<()> {
        self.connection.change_property32(
            PropMode::REPLACE,
            window,
            self.atoms.wm_state,
            self.atoms.wm_state,
            &[state, x11rb::NONE],
        )?;
        Ok(())
    }

    fn update_client_list(&self) -> WmResult<()> {
        self.connection
            .delete_property(self.root, self.atoms.net_client_list)?;
        let mut ordered: Vec<Window> = Vec::with_capacity(self.windows.len());
        for monitor in &self.monitors {
            ordered.extend(client::arrangement(&self.clients, monitor));
        }
        self.connection.change_property32(
            PropMode::APPEND,
            self.root,
            self.atoms.net_client_list,
            AtomEnum::WINDOW,
            &ordered,
        )?;
        Ok(())
    }

    fn window_class_instance(&self, window: Window) -> WmResult<(String, String)> {
        let Ok(reply) = self
            .connection
            .get_property(false, window, AtomEnum::WM_CLASS, AtomEnum::STRING, 0, 1024)?
            .reply()
        else {
            return Ok((String::new(), String::new()));
        };
        if reply.value.is_empty() {
            return Ok((String::new(), String::new()));
        }

        let text = String::from_utf8_lossy(&reply.value);
        let mut parts = text.split('\0');
        let instance = parts.next().unwrap_or_default().to_string();
        let class = parts.next().unwrap_or_default().to_string();
        Ok((class, instance))
    }

    /// True when the window's class contains `class` and its instance
    /// contains `instance`. Windows without a class hint never match.
    fn wm_class_contains(
        &self,
        window: Window,
        class: &str,
        instance: &str,
    ) -> WmResult<bool> {
        let (window_class, window_instance) = self.window_class_instance(window)?;
        if window_class.is_empty() && window_instance.is_empty() {
            return Ok(false);
        }
        Ok(window_class.contains(class) && window_instance.contains(instance))
    }

    fn transient_for(&self, window: Window) -> Option<Window> {
        self.connection
            .get_property(
                false,
                window,
                AtomEnum::WM_TRANSIENT_FOR,
                AtomEnum::WINDOW,
                0,
                1,
            )
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .and_then(|reply| reply.value32().and_then(|mut windows| windows.next()))
            .filter(|&parent| parent != x11rb::NONE)
    }

    fn grab_buttons(&self, window: Window, focused: bool) -> WmResult<()> {
        self.connection
            .ungrab_button(ButtonIndex::ANY, window, ModMask::ANY)?;

        if !focused {
            self.connection.grab_button(
                false,
                window,
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE,
                GrabMode::SYNC,
                GrabMode::SYNC,
                x11rb::NONE,
                x11rb::NONE,
                ButtonIndex::ANY,
                ModMask::ANY,
            )?;
        }

        for binding in &self.config.buttons {
            if binding.click != ClickRegion::ClientWin {
                continue;
            }
            for extra in keyboard::ignored_modifiers(self.numlock) {
                self.connection.grab_button(
                    false,
                    window,
                    EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE,
                    GrabMode::ASYNC,
                    GrabMode::SYNC,
                    x11rb::NONE,
                    x11rb::NONE,
                    ButtonIndex::from(binding.button),
                    (binding.mods | extra).into(),
                )?;
            }
        }
        Ok(())
    }

    /// Serialize against the server, like an XSync without event discard.
    fn sync(&self) -> WmResult<()> {
        self.connection.get_input_focus()?.reply()?;
        Ok(())
    }

    fn quit(&mut self) {
        info!("shutting down");
        self.running = false;
    }

    /// Release every client and server resource we hold. The inverse of
    /// `new` plus `scan`.
    pub fn cleanup(&mut self) -> WmResult<()> {
        self.view(!0)?;
        for index in 0..self.monitors.len() {
            while let Some(window) = self.monitors[index].stack_head {
                self.unmanage(window, false)?;
            }
        }

        self.connection
            .ungrab_key(Grab::ANY, self.root, ModMask::ANY)?;
        self.monitors.clear();
        self.connection.destroy_window(self.check_window)?;
        self.connection.set_input_focus(
            InputFocus::POINTER_ROOT,
            u32::from(InputFocus::POINTER_ROOT),
            x11rb::CURRENT_TIME,
        )?;
        self.connection
            .delete_property(self.root, self.atoms.net_active_window)?;
        self.sync()?;
        Ok(())
    }
}
