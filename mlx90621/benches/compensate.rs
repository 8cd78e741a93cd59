use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use mlx90621::calculations::{compensate, estimate};
use mlx90621::transport::{read_compensation_pixel, read_ir_frame, read_ptat};
use mlx90621::{BusAddresses, CalibrationTable, Mlx90621, RawIrFrame, RefreshRate, Resolution};
use mlx90621_test_data::*;

pub fn criterion_benchmark(c: &mut Criterion) {
    let addresses = BusAddresses::default();
    let mut mocked = MockSensorBus::new(addresses.eeprom, addresses.device, &fixture_eeprom());
    mocked.set_ptat(FIXTURE_PTAT);
    mocked.set_compensation_pixel(FIXTURE_COMPENSATION_PIXEL);
    mocked.set_ir_data(&fixture_ir_data());
    let calibration = CalibrationTable::from_data(&fixture_eeprom());
    let ir = RawIrFrame::new(fixture_ir_data());

    let mut group = c.benchmark_group("Raw to Temperatures");

    group.bench_function("ambient", |b| {
        b.iter(|| estimate(FIXTURE_PTAT, &calibration, Resolution::Sixteen))
    });

    group.bench_function("compensate", |b| {
        b.iter(|| {
            compensate(
                &ir,
                FIXTURE_COMPENSATION_PIXEL,
                FIXTURE_AMBIENT,
                &calibration,
                Resolution::Sixteen,
            )
        })
    });

    let setup = || {
        let mut bus = mocked.clone();
        let ptat = read_ptat(&mut bus, addresses.device).unwrap();
        let compensation_pixel = read_compensation_pixel(&mut bus, addresses.device).unwrap();
        let ir = read_ir_frame(&mut bus, addresses.device).unwrap();
        (ptat, compensation_pixel, ir)
    };

    group.bench_function("split functions", |b| {
        b.iter_batched(
            setup,
            |(ptat, compensation_pixel, ir)| {
                let ambient = estimate(ptat, &calibration, Resolution::Sixteen);
                compensate(
                    &ir,
                    compensation_pixel,
                    ambient,
                    &calibration,
                    Resolution::Sixteen,
                )
            },
            BatchSize::SmallInput,
        )
    });

    let mut driver = Mlx90621::new(mocked.clone(), addresses, RefreshRate::Four).unwrap();
    group.bench_function("driver", |b| {
        b.iter(|| driver.generate_frame(FIXTURE_AMBIENT).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
