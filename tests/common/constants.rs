//! Shared constants for end-to-end tests
//!
//! This module contains all constants used across the test suite.
//! When test data changes (user credentials, stub labels, etc.),
//! update only this file.
#![allow(dead_code)]

// ============================================================================
// Test User Credentials
// ============================================================================

/// Regular test user name
pub const TEST_USER: &str = "testuser";

/// Regular test user password
pub const TEST_PASS: &str = "testpass123";

/// Regular test user email
pub const TEST_EMAIL: &str = "testuser@moodify.test";

/// Second user, used to check that profiles are not shared
pub const OTHER_USER: &str = "otheruser";

/// Second user password
pub const OTHER_PASS: &str = "otherpass123";

/// Second user email
pub const OTHER_EMAIL: &str = "otheruser@moodify.test";

/// Secret the test server signs tokens with
pub const TEST_JWT_SECRET: &str = "moodify-test-secret";

// ============================================================================
// Stub Models
// ============================================================================

/// Label returned by the stub text model for most inputs
pub const STUB_TEXT_EMOTION: &str = "joy";

/// Label returned by the stub text model when the input mentions "sad"
pub const STUB_SAD_TEXT_EMOTION: &str = "sadness";

/// Text the stub text model fails on, as if the model were down
pub const STUB_TEXT_FAILURE_INPUT: &str = "please fail";

/// Label returned by the stub speech model
pub const STUB_SPEECH_EMOTION: &str = "calm";

/// Label returned by the stub facial model
pub const STUB_FACIAL_EMOTION: &str = "happy";

/// Emotion the stub recommender fails on
pub const STUB_RECOMMENDER_FAILURE_EMOTION: &str = "broken";

/// Number of songs the stub recommender returns
pub const STUB_RECOMMENDATIONS_COUNT: usize = 3;

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;

/// Upload limit of the test server (bytes)
pub const TEST_MAX_UPLOAD_BYTES: usize = 2 * 1024 * 1024;
