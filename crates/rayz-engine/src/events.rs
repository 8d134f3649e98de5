/// Side effects produced by an engine transition.
///
/// The engine never performs I/O; each mutator returns the events the
/// transition caused and the router turns them into WebSocket frames,
/// peer datagrams and laser pulses after the state change has landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A shot left the barrel: emit the laser frame, notify WS clients
    /// and broadcast a SHOT datagram to peers.
    ShotFired { seq_id: u8, laser_frame: u32 },
    /// A hit was applied (or survived). A fatal hit additionally sends a
    /// HIT_EVENT datagram to the shooter so it can credit the kill.
    HitReport {
        fatal: bool,
        shooter_id: u8,
        damage: u16,
    },
    /// A friendly-fire hit was rejected under team play.
    HitInvalid { shooter_id: u8 },
    /// Respawn cooldown expired; the player is back in the game.
    Respawn { current_hearts: u16 },
    /// Reload finished and the magazine is full again.
    ReloadComplete { current_ammo: u16 },
    /// The match timer ran out.
    GameOver,
}
