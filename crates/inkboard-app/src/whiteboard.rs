//! Client-side whiteboard: input, camera, raster and sync in one place.

use inkboard_core::camera::Viewport;
use inkboard_core::config::BoardConfig;
use inkboard_core::input::{GestureAction, GestureMachine, PointerEvent};
use inkboard_core::protocol::ServerMessage;
use inkboard_core::session::{Session, SessionEffect, SessionState};
use inkboard_core::sync::{NativeWebSocket, SyncEvent};
use inkboard_core::tools::{ToolKind, ToolSettings};
use inkboard_render::{Compositor, Pixmap, RenderResult, Renderer, screen_surface};
use kurbo::{Point, Size};

/// One participant's view of a shared board.
///
/// Events are processed one at a time; nothing here is shared across
/// threads.
pub struct Whiteboard {
    viewport: Viewport,
    gestures: GestureMachine,
    tools: ToolSettings,
    session: Session,
    compositor: Compositor,
    screen: Pixmap,
    /// The screen surface is stale.
    dirty: bool,
}

impl Whiteboard {
    /// Create a whiteboard for `config` shown on a `screen`-sized surface.
    pub fn new(config: &BoardConfig, screen: Size) -> RenderResult<Self> {
        let mut viewport = Viewport::new(config);
        viewport.on_resize(screen.width, screen.height);
        Ok(Self {
            screen: screen_surface(viewport.screen_size())?,
            viewport,
            gestures: GestureMachine::new(config.wheel_zoom_step),
            tools: ToolSettings::new(config),
            session: Session::new(config.world_size()),
            compositor: Compositor::from_config(config)?,
            dirty: true,
        })
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tools(&self) -> &ToolSettings {
        &self.tools
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn is_live(&self) -> bool {
        self.session.is_live()
    }

    /// Resize the screen surface and refit the camera.
    pub fn resize(&mut self, width: f64, height: f64) -> RenderResult<()> {
        self.viewport.on_resize(width, height);
        self.screen = screen_surface(self.viewport.screen_size())?;
        self.dirty = true;
        Ok(())
    }

    /// Feed one pointer event through the gesture machine.
    pub fn handle_pointer(&mut self, event: PointerEvent) {
        let actions = self.gestures.handle(event, &mut self.viewport);
        for action in actions {
            self.apply_action(action);
        }
    }

    /// Switch tools, ending any stroke in progress.
    pub fn set_tool(&mut self, tool: ToolKind) {
        if self.tools.set_tool(tool) {
            if let Some(action) = self.gestures.end_stroke() {
                self.apply_action(action);
            }
        }
    }

    /// Ask the authority to remove this participant's segments under a
    /// screen-space circle.
    pub fn erase_own_at(&mut self, screen_point: Point, screen_radius: f64) -> bool {
        let center = self.viewport.screen_to_world(screen_point);
        let radius = screen_radius / self.viewport.zoom();
        self.session.request_erase_own(center, radius)
    }

    fn apply_action(&mut self, action: GestureAction) {
        match action {
            GestureAction::Segment { from, to } => {
                if let Some(segment) = self.session.draw(from, to, self.tools.style()) {
                    self.compositor.apply_segment(&segment);
                    self.dirty = true;
                }
            }
            GestureAction::StrokeEnded => {}
            GestureAction::ViewChanged => self.dirty = true,
        }
    }

    pub fn on_connected(&mut self) {
        self.session.on_connected();
    }

    pub fn on_disconnected(&mut self) {
        self.session.on_disconnected();
    }

    /// About to dial again. The raster keeps showing the old board until
    /// the new snapshot rebuilds it.
    pub fn on_reconnecting(&mut self) {
        self.session.reconnecting();
    }

    /// Apply one message from the authority to the replica and raster.
    pub fn handle_server_message(&mut self, msg: ServerMessage) {
        match self.session.handle_message(msg) {
            Some(SessionEffect::Apply(segment)) => {
                self.compositor.apply_segment(&segment);
                self.dirty = true;
            }
            Some(SessionEffect::Rebuild) => {
                self.compositor.rebuild_from_history(self.session.history().iter());
                self.dirty = true;
            }
            Some(SessionEffect::Welcomed { owner_id }) => {
                log::info!("Joined as {}", owner_id);
            }
            Some(SessionEffect::Rejected { message }) => {
                log::warn!("Server rejected input, resyncing: {}", message);
            }
            None => {}
        }
    }

    /// Pending protocol messages for the transport.
    pub fn take_outgoing(&mut self) -> Vec<String> {
        self.session.take_outgoing()
    }

    /// Exchange everything pending with the transport. Sends are best effort.
    pub fn pump(&mut self, socket: &mut NativeWebSocket) {
        for event in socket.poll_events() {
            match event {
                SyncEvent::Connected => self.on_connected(),
                SyncEvent::Disconnected => self.on_disconnected(),
                SyncEvent::Received(msg) => self.handle_server_message(msg),
                SyncEvent::Error { message } => {
                    log::error!("Connection error: {}", message);
                    self.on_disconnected();
                }
            }
        }

        if self.session.state() == SessionState::Disconnected {
            return;
        }
        for msg in self.take_outgoing() {
            if let Err(e) = socket.send(&msg) {
                log::warn!("Dropping outgoing message: {}", e);
            }
        }
    }

    /// Present the world raster through the camera if anything changed.
    pub fn render(&mut self) -> &Pixmap {
        if self.dirty {
            self.compositor.present(&mut self.screen, self.viewport.view());
            self.dirty = false;
        }
        &self.screen
    }

    /// Encode the whole board (world surface) as PNG.
    pub fn export_png(&self) -> RenderResult<Vec<u8>> {
        self.compositor.encode_png()
    }
}
