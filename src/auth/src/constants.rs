// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub(crate) const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
pub(crate) const GOOGLE_SCOPE_PREFIX: &str = "https://www.googleapis.com/auth/";
/// OpenID Connect scopes that Google accepts without the URL prefix.
pub(crate) const OPENID_SCOPES: [&str; 3] = ["openid", "email", "profile"];

pub(crate) const ADC_ENV_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub(crate) const CLOUDSDK_CONFIG_ENV_VAR: &str = "CLOUDSDK_CONFIG";
pub(crate) const ADC_FILE_NAME: &str = "application_default_credentials.json";

pub(crate) const GCE_METADATA_HOST_ENV_VAR: &str = "GCE_METADATA_HOST";
pub(crate) const ALLOW_EXECUTABLES_ENV_VAR: &str = "GOOGLE_EXTERNAL_ACCOUNT_ALLOW_EXECUTABLES";

pub(crate) const CACHE_DIR_ENV_VAR: &str = "GOOGLE_TOKEN_FETCH_CACHE";
/// Used as the cache directory name and the default `package`.
pub(crate) const CRATE_NAME: &str = "google-cloud-token-fetch";
