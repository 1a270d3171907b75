//! The command catalog.
//!
//! Track and item indices are 0-based on the wire.

mod midi;
mod plugins;
mod project;
mod scripting;
mod tracks;
mod transport;

use crate::registry::CommandRegistry;

/// Register every built-in command.
pub fn register_all(registry: &mut CommandRegistry) {
    registry.register("get_session_info", project::get_session_info);
    registry.register("set_tempo", project::set_tempo);
    registry.register("set_time_signature", project::set_time_signature);

    registry.register("list_tracks", tracks::list_tracks);
    registry.register("create_track", tracks::create_track);
    registry.register("name_selected_track", tracks::name_selected_track);
    registry.register("select_track", tracks::select_track);
    registry.register("set_track_volume", tracks::set_track_volume);
    registry.register("set_track_pan", tracks::set_track_pan);
    registry.register("mute_track", tracks::mute_track);
    registry.register("solo_track", tracks::solo_track);
    registry.register("arm_track", tracks::arm_track);

    registry.register("insert_midi_item", midi::insert_midi_item);
    registry.register("create_midi_item", midi::insert_midi_item);
    registry.register("add_notes", midi::add_notes);

    registry.register("play", transport::play);
    registry.register("stop", transport::stop);
    registry.register("pause", transport::pause);
    registry.register("record", transport::record);
    registry.register("goto_position", transport::goto_position);
    registry.register("trigger_action", transport::trigger_action);

    registry.register("list_plugins", plugins::list_plugins);
    registry.register("load_plugin", plugins::load_plugin);

    registry.register("execute_lua", scripting::execute_lua);
    registry.register("execute_lua_file", scripting::execute_lua_file);
}
