//! Slack Integration - Socket Mode bot interface
//!
//! This crate provides the Slack interface for signoff:
//! - **Socket Mode** (`socket`) - WebSocket connection to Slack (no public URL needed)
//! - **Slash Commands** (`commands`) - `/signoff new`, `/signoff status`, etc.
//! - **Events** (`events`) - Button clicks, modal submissions, dispatch
//! - **Block Kit** (`blocks`) - Decision cards and notification messages
//! - **Views** (`views`) - The request submission modal
//! - **Web API** (`api`) - Outbound `ChatApi` (post, update, open view, join)
//! - **Directory** (`directory`) - User id to display name resolution
//! - **Notify** (`notify`) - Notification fan-out executor
//! - **Workflow** (`workflow`) - Service wiring for the approval lifecycle
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Socket Mode and interactivity
//! 3. Add the slash command: `/signoff`
//! 4. Set env vars: `SIGNOFF_SLACK_APP_TOKEN`, `SIGNOFF_SLACK_BOT_TOKEN`
//!
//! # Architecture
//!
//! ```text
//! Slack Events → EventDispatcher → Handlers → ApprovalWorkflow → signoff-core
//!                                                 ↓
//!                                     Fan-out plan → NotificationExecutor → ChatApi
//! ```
//!
//! # Key Types
//!
//! - `SocketModeRunner` - WebSocket event loop with reconnection logic
//! - `EventDispatcher` - Routes events to appropriate handlers
//! - `ApprovalWorkflow` - Concrete `WorkflowService`/`DestinationAdmin`
//! - `NotificationExecutor` - Delivers planned notifications with isolation

pub mod api;
pub mod blocks;
pub mod commands;
pub mod directory;
pub mod events;
pub mod notify;
pub mod socket;
pub mod views;
pub mod workflow;
