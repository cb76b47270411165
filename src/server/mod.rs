//! REST API server of the media node.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐                      ┌──────────────────────────┐
//! │   API Server Thread     │  handle_request()    │   Arc<AppState>          │
//! │   (rouille HTTP)        │  ─────────────────▶  │                          │
//! │                         │                      │  NodeSettings  ─▶ ini    │
//! │  PUT /api/node/name/x   │                      │  Displays      ─▶ xrandr │
//! │  POST /api/players      │                      │  Instances     ─▶ *.ini  │
//! └─────────────────────────┘                      └──────────────────────────┘
//! ```
//!
//! - **rouille** - sync HTTP server, one worker per connection
//! - **AppState** - services built once in `main.rs`; each store serializes
//!   its own read-modify-write cycles
//!
//! # Endpoints
//!
//! | Method | Path                                      | Description              |
//! |--------|-------------------------------------------|--------------------------|
//! | GET    | `/api/health`                             | Health check             |
//! | GET    | `/api/node`                               | Effective node settings  |
//! | GET    | `/api/node/name`                          | Node name                |
//! | PUT    | `/api/node/name/{name}`                   | Rename node              |
//! | POST   | `/api/node/hostname`                      | New generated hostname   |
//! | POST   | `/api/audio/devices/{dev}/default`        | Set default sink         |
//! | POST   | `/api/audio/devices/{dev}/volume/{level}` | Set sink volume          |
//! | GET    | `/api/displays/config`                    | Stored display configs   |
//! | POST   | `/api/displays/config`                    | Apply display config     |
//! | DELETE | `/api/displays/config/{name}`             | Forget display config    |
//! | GET    | `/api/players`                            | List players             |
//! | POST   | `/api/players`                            | Create player            |
//! | GET    | `/api/players/{uuid}`                     | Get player               |
//! | PATCH  | `/api/players/{uuid}`                     | Update player settings   |
//! | DELETE | `/api/players/{uuid}`                     | Delete player            |
//! | *      | `/api/browsers[/{uuid}]`                  | Same as players          |

mod api;

pub use api::{ApiServer, AppState};
