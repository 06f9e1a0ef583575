use std::collections::HashMap;

use advision_core::core::machine::InputButton;
use sdl2::keyboard::Scancode;

/// Maps SDL scancodes to machine button IDs.
pub struct KeyMap {
    map: HashMap<Scancode, u8>,
}

impl KeyMap {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Bind a scancode to a machine button ID.
    pub fn bind(&mut self, scancode: Scancode, button_id: u8) {
        self.map.insert(scancode, button_id);
    }

    /// Look up the machine button ID for a scancode.
    pub fn get(&self, scancode: Scancode) -> Option<u8> {
        self.map.get(&scancode).copied()
    }
}

/// Build the default key map from a machine's input buttons by name:
/// arrows for the stick, Z/X/A/S for the four side buttons.
pub fn default_key_map(buttons: &[InputButton]) -> KeyMap {
    let mut km = KeyMap::new();

    for button in buttons {
        let scancode = match button.name {
            "Up" => Some(Scancode::Up),
            "Down" => Some(Scancode::Down),
            "Left" => Some(Scancode::Left),
            "Right" => Some(Scancode::Right),
            "Button 1" => Some(Scancode::Z),
            "Button 2" => Some(Scancode::X),
            "Button 3" => Some(Scancode::A),
            "Button 4" => Some(Scancode::S),
            _ => None,
        };

        if let Some(sc) = scancode {
            km.bind(sc, button.id);
        }
    }

    km
}
